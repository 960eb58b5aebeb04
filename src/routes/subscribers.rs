use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::SubscriberStore;
use crate::db::{DocFilter, Document};
use crate::error::{AppError, Result};
use crate::extract::{ValidJson, ValidPath, ValidQuery};
use crate::mail::Recipients;
use crate::middleware::AuthClaims;
use crate::models::{NewSubscriberRequest, NewsletterRequest, NewsletterResponse, Subscriber};
use crate::pagination::{PaginationQuery, PaginationResult, Sort, SortDirection};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListSubscribersParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub sort: Option<String>,
    pub order: Option<SortDirection>,
}

impl ListSubscribersParams {
    fn sort(&self) -> Result<Option<Sort>> {
        self.sort
            .as_deref()
            .map(|field| Sort::parse(field, self.order.unwrap_or(SortDirection::Desc)))
            .transpose()
    }
}

/// List subscribers one page at a time
///
/// `?page=&limit=` default to 1 and 10; `?sort=<field>&order=asc|desc`
/// defaults to newest first.
pub async fn list_subscribers<S: SubscriberStore>(
    State(state): State<AppState<S>>,
    ValidQuery(params): ValidQuery<ListSubscribersParams>,
) -> Result<Json<PaginationResult<Document<Subscriber>>>> {
    let request = PaginationQuery {
        page: params.page,
        limit: params.limit,
    }
    .validate()?;
    let sort = params.sort()?;

    let page = state
        .repo
        .paginated_list(&DocFilter::all(), request, sort)
        .await?;

    Ok(Json(page))
}

pub async fn get_subscriber<S: SubscriberStore>(
    State(state): State<AppState<S>>,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Document<Subscriber>>> {
    Ok(Json(state.repo.find_by_id_or_error(id).await?))
}

pub async fn create_subscriber<S: SubscriberStore>(
    State(state): State<AppState<S>>,
    AuthClaims(claims): AuthClaims,
    ValidJson(payload): ValidJson<NewSubscriberRequest>,
) -> Result<(StatusCode, Json<Document<Subscriber>>)> {
    let subscriber = payload.into_subscriber()?;

    let duplicate = DocFilter::all().with("email", subscriber.email.clone());
    if state.repo.exists(&duplicate).await? {
        return Err(AppError::invalid_field("email", "Email is already subscribed"));
    }

    let created = state.repo.create(subscriber).await?;
    tracing::info!("Subscriber {} added by {}", created.id, claims.sub);

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn delete_subscriber<S: SubscriberStore>(
    State(state): State<AppState<S>>,
    AuthClaims(claims): AuthClaims,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Document<Subscriber>>> {
    let removed = state.repo.delete_by_id_or_error(id).await?;
    tracing::info!("Subscriber {} removed by {}", id, claims.sub);

    Ok(Json(removed))
}

/// Mail every active subscriber
///
/// Delivery is paced over minutes, so it runs in the background and the
/// request is answered with 202 and the planned batch count.
pub async fn send_newsletter<S: SubscriberStore>(
    State(state): State<AppState<S>>,
    AuthClaims(claims): AuthClaims,
    ValidJson(payload): ValidJson<NewsletterRequest>,
) -> Result<(StatusCode, Json<NewsletterResponse>)> {
    payload.validate()?;

    let addresses: Vec<String> = state
        .repo
        .distinct("email", &DocFilter::all().with("active", true))
        .await?
        .into_iter()
        .filter_map(|value| value.as_str().map(str::to_string))
        .collect();

    let recipients = addresses.len();
    let batches = state.mailer.job(Recipients::Many(addresses.clone())).batches();

    if recipients > 0 {
        let mailer = state.mailer.clone();
        tokio::spawn(async move {
            let report = mailer
                .send_bulk(
                    &payload.subject,
                    Recipients::Many(addresses),
                    payload.text,
                    payload.html,
                )
                .await;
            tracing::info!(
                "Newsletter finished: {} of {} batches delivered",
                report.delivered(),
                report.len()
            );
        });
    }

    tracing::info!(
        "Newsletter to {} subscribers queued by {}",
        recipients,
        claims.sub
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(NewsletterResponse {
            recipients,
            batches,
        }),
    ))
}
