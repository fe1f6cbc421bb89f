//! Table and index definitions, applied in order on connect.
//!
//! Timestamps are stored as microseconds since the epoch so that
//! `ORDER BY created_at` is numeric.

pub const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS projects (
        id             BLOB PRIMARY KEY NOT NULL,
        title          TEXT NOT NULL,
        slug           TEXT NOT NULL DEFAULT '',
        description    TEXT NOT NULL DEFAULT '',
        main_image     TEXT NOT NULL DEFAULT '',
        screenshots    TEXT NOT NULL DEFAULT '[]',
        link           TEXT NOT NULL DEFAULT '',
        tags           TEXT NOT NULL DEFAULT '[]',
        creator_id     TEXT NOT NULL,
        creator_name   TEXT NOT NULL,
        creator_avatar TEXT,
        vote_count     INTEGER NOT NULL DEFAULT 0,
        comment_count  INTEGER NOT NULL DEFAULT 0,
        created_at     INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS projects_by_creator ON projects (creator_id, created_at)",
    "CREATE INDEX IF NOT EXISTS projects_by_votes ON projects (vote_count DESC, created_at DESC)",
    // Legacy rows may carry an empty slug until backfilled.
    "CREATE UNIQUE INDEX IF NOT EXISTS projects_by_slug ON projects (slug) WHERE slug <> ''",
    "CREATE TABLE IF NOT EXISTS comments (
        id            BLOB PRIMARY KEY NOT NULL,
        project_id    BLOB NOT NULL,
        author_id     TEXT NOT NULL,
        author_name   TEXT NOT NULL,
        author_avatar TEXT,
        content       TEXT NOT NULL,
        parent_id     BLOB,
        vote_count    INTEGER NOT NULL DEFAULT 0,
        depth         INTEGER NOT NULL DEFAULT 0,
        created_at    INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS comments_by_project ON comments (project_id, created_at)",
    "CREATE INDEX IF NOT EXISTS comments_by_parent ON comments (parent_id, created_at)",
    "CREATE INDEX IF NOT EXISTS comments_by_author ON comments (author_id, created_at)",
    "CREATE TABLE IF NOT EXISTS votes (
        id         BLOB PRIMARY KEY NOT NULL,
        project_id BLOB NOT NULL,
        voter_id   TEXT NOT NULL,
        kind       TEXT NOT NULL CHECK (kind IN ('project', 'comment')),
        target_id  BLOB NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS votes_by_project_and_user ON votes (project_id, voter_id)",
    "CREATE INDEX IF NOT EXISTS votes_by_user ON votes (voter_id, created_at)",
    "CREATE INDEX IF NOT EXISTS votes_by_target ON votes (target_id, kind)",
    "CREATE UNIQUE INDEX IF NOT EXISTS votes_one_per_voter ON votes (voter_id, target_id, kind)",
];
