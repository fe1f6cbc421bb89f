//! # vh-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the showcase managers.

use crate::error::ApiResult;
use crate::identity::Identity;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vh_core::{NewComment, NewProject, ProjectPatch, Showcase, VoteKind};

/// State shared across all Actix-web workers.
pub struct AppState {
    pub showcase: Showcase,
}

impl AppState {
    pub fn new(showcase: Showcase) -> Self {
        Self { showcase }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    /// Comma separated
    #[serde(default)]
    pub tags: Option<String>,
}

impl SearchQuery {
    fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(String::from)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentBody {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBody {
    pub content: String,
}

#[derive(Debug, Serialize)]
struct VotedBody {
    voted: bool,
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

// ── Projects ─────────────────────────────────────────────────────────────────

pub async fn list_projects(data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let projects = data.showcase.projects.list_by_votes().await?;
    Ok(HttpResponse::Ok().json(projects))
}

pub async fn create_project(
    data: web::Data<AppState>,
    Identity(actor): Identity,
    body: web::Json<NewProject>,
) -> ApiResult<HttpResponse> {
    let project = data.showcase.projects.create(&actor, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(project))
}

pub async fn search_projects(
    data: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> ApiResult<HttpResponse> {
    let projects = data
        .showcase
        .projects
        .search(&query.q, &query.tag_list())
        .await?;
    Ok(HttpResponse::Ok().json(projects))
}

pub async fn get_project(data: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let project = data.showcase.projects.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(project))
}

pub async fn project_by_slug(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let project = data.showcase.projects.get_by_slug(&path).await?;
    Ok(HttpResponse::Ok().json(project))
}

pub async fn update_project(
    data: web::Data<AppState>,
    Identity(actor): Identity,
    path: web::Path<Uuid>,
    body: web::Json<ProjectPatch>,
) -> ApiResult<HttpResponse> {
    let project = data
        .showcase
        .projects
        .update(&actor, path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(project))
}

pub async fn delete_project(
    data: web::Data<AppState>,
    Identity(actor): Identity,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let report = data.showcase.projects.delete(&actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn projects_by_user(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let projects = data.showcase.projects.list_by_creator(&path).await?;
    Ok(HttpResponse::Ok().json(projects))
}

// ── Comments ─────────────────────────────────────────────────────────────────

pub async fn list_comments(data: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let comments = data.showcase.comments.list_thread(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(comments))
}

pub async fn create_comment(
    data: web::Data<AppState>,
    Identity(actor): Identity,
    path: web::Path<Uuid>,
    body: web::Json<CommentBody>,
) -> ApiResult<HttpResponse> {
    let CommentBody { content, parent_id } = body.into_inner();
    let new = NewComment {
        project_id: path.into_inner(),
        content,
        parent_id,
    };
    let comment = data.showcase.comments.create(&actor, new).await?;
    Ok(HttpResponse::Created().json(comment))
}

pub async fn get_comment(data: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let comment = data.showcase.comments.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(comment))
}

pub async fn update_comment(
    data: web::Data<AppState>,
    Identity(actor): Identity,
    path: web::Path<Uuid>,
    body: web::Json<ContentBody>,
) -> ApiResult<HttpResponse> {
    let comment = data
        .showcase
        .comments
        .update(&actor, path.into_inner(), &body.content)
        .await?;
    Ok(HttpResponse::Ok().json(comment))
}

pub async fn delete_comment(
    data: web::Data<AppState>,
    Identity(actor): Identity,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let report = data.showcase.comments.delete(&actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn list_replies(data: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let replies = data.showcase.comments.list_replies(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(replies))
}

pub async fn comments_by_user(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let comments = data.showcase.comments.list_by_author(&path).await?;
    Ok(HttpResponse::Ok().json(comments))
}

// ── Votes ────────────────────────────────────────────────────────────────────

pub async fn vote_project(
    data: web::Data<AppState>,
    Identity(actor): Identity,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let vote = data.showcase.votes.vote_for_project(&actor, path.into_inner()).await?;
    Ok(HttpResponse::Created().json(vote))
}

pub async fn unvote_project(
    data: web::Data<AppState>,
    Identity(actor): Identity,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    data.showcase.votes.unvote_for_project(&actor, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn vote_comment(
    data: web::Data<AppState>,
    Identity(actor): Identity,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let vote = data.showcase.votes.vote_for_comment(&actor, path.into_inner()).await?;
    Ok(HttpResponse::Created().json(vote))
}

pub async fn unvote_comment(
    data: web::Data<AppState>,
    Identity(actor): Identity,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    data.showcase.votes.unvote_for_comment(&actor, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Whether the caller has voted for the given project or comment.
pub async fn has_voted(
    data: web::Data<AppState>,
    Identity(actor): Identity,
    path: web::Path<(VoteKind, Uuid)>,
) -> ApiResult<HttpResponse> {
    let (kind, target_id) = path.into_inner();
    let voted = data
        .showcase
        .votes
        .has_voted(kind, target_id, &actor.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(VotedBody { voted }))
}

pub async fn votes_by_user(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    let votes = data.showcase.votes.votes_by_user(&path).await?;
    Ok(HttpResponse::Ok().json(votes))
}
