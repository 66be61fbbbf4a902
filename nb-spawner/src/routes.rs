//! The spawner's HTTP surface, mounted under `/nublado/spawner/v1`.
//! Authentication is bearer tokens forwarded by the gateway; scope
//! validation is delegated to the external identity service via the
//! request guards below.

use futures::StreamExt;
use nb_api::v1::{
    DisplayImages,
    LabSpecification,
    PrepullerStatus,
    UserData,
    UserInfo,
};
use nb_core::prelude::*;
use rocket::State;
use rocket::http::Status;
use rocket::request::{
    FromRequest,
    Outcome,
    Request,
};
use rocket::response::Redirect;
use rocket::response::content::RawHtml;
use rocket::response::stream::{
    Event as SseEvent,
    EventStream,
};
use rocket::serde::json::Json;
use tracing::*;

use crate::context::ServiceContext;
use crate::errors::ApiError;
use crate::form;

/// A token carrying user scope, resolved to the user it belongs to.
pub struct UserToken {
    pub token: String,
    pub user: UserInfo,
}

/// A token carrying admin scope.
pub struct AdminToken;

fn bearer_token(req: &Request<'_>) -> Option<String> {
    let header = req.headers().get_one("Authorization")?;
    let (scheme, token) = header.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim().to_string())
    } else {
        None
    }
}

async fn token_scopes(req: &Request<'_>) -> Option<(String, Vec<String>)> {
    let ctx = req.rocket().state::<ServiceContext>()?;
    let token = bearer_token(req)?;
    match ctx.identity.get_scopes(&token).await {
        Ok(scopes) => Some((token, scopes)),
        Err(e) => {
            warn!("token validation failed: {e:#}");
            None
        },
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserToken {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<UserToken, ()> {
        let Some((token, scopes)) = token_scopes(req).await else {
            return Outcome::Error((Status::Forbidden, ()));
        };
        if !scopes.iter().any(|s| s == USER_SCOPE) {
            return Outcome::Error((Status::Forbidden, ()));
        }

        let Some(ctx) = req.rocket().state::<ServiceContext>() else {
            return Outcome::Error((Status::InternalServerError, ()));
        };
        match ctx.identity.get_user(&token).await {
            Ok(user) => Outcome::Success(UserToken { token, user }),
            Err(e) => {
                warn!("could not resolve token user: {e:#}");
                Outcome::Error((Status::Forbidden, ()))
            },
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminToken {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<AdminToken, ()> {
        match token_scopes(req).await {
            Some((_, scopes)) if scopes.iter().any(|s| s == ADMIN_SCOPE) => Outcome::Success(AdminToken),
            _ => Outcome::Error((Status::Forbidden, ())),
        }
    }
}

#[rocket::get("/labs")]
pub async fn get_lab_users(_token: AdminToken, ctx: &State<ServiceContext>) -> Json<Vec<String>> {
    Json(ctx.user_map.running())
}

#[rocket::get("/labs/<username>")]
pub async fn get_userdata(
    username: &str,
    _token: AdminToken,
    ctx: &State<ServiceContext>,
) -> Result<Json<UserData>, ApiError> {
    ctx.user_map
        .get(username)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no lab found for {username}")))
}

#[rocket::post("/labs/<username>/create", data = "<spec>")]
pub async fn post_new_lab(
    username: &str,
    spec: Json<LabSpecification>,
    token: UserToken,
    ctx: &State<ServiceContext>,
) -> Result<Redirect, ApiError> {
    if token.user.username != username {
        return Err(ApiError::Forbidden(format!("token does not belong to {username}")));
    }
    ctx.lab_manager.create(&token.user, &spec, &token.token).await?;
    Ok(Redirect::to(format!("{API_BASE_PATH}/labs/{username}")))
}

#[rocket::delete("/labs/<username>")]
pub async fn delete_user_lab(
    username: &str,
    _token: AdminToken,
    ctx: &State<ServiceContext>,
) -> Result<Status, ApiError> {
    ctx.lab_manager.delete(username).await?;
    Ok(Status::Accepted)
}

#[rocket::get("/labs/<username>/events")]
pub async fn get_user_events(
    username: &str,
    token: UserToken,
    ctx: &State<ServiceContext>,
) -> Result<EventStream![SseEvent + 'static], ApiError> {
    if token.user.username != username {
        return Err(ApiError::Forbidden(format!("token does not belong to {username}")));
    }

    let stream = ctx.events.publish(username);
    Ok(EventStream! {
        tokio::pin!(stream);
        while let Some(event) = stream.next().await {
            yield SseEvent::data(event.data.clone()).event(event.event.to_string());
        }
    })
}

#[rocket::get("/user-status")]
pub async fn get_user_status(token: UserToken, ctx: &State<ServiceContext>) -> Result<Json<UserData>, ApiError> {
    ctx.user_map
        .get(&token.user.username)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no lab found for {}", token.user.username)))
}

#[rocket::get("/images")]
pub async fn get_images(_token: AdminToken, ctx: &State<ServiceContext>) -> Result<Json<DisplayImages>, ApiError> {
    Ok(Json(ctx.prepuller.menu_images().await?))
}

#[rocket::get("/prepulls")]
pub async fn get_prepulls(_token: AdminToken, ctx: &State<ServiceContext>) -> Result<Json<PrepullerStatus>, ApiError> {
    Ok(Json(ctx.prepuller.get_prepulls().await?))
}

#[rocket::get("/lab-form/<username>")]
pub async fn get_lab_form(
    username: &str,
    token: UserToken,
    ctx: &State<ServiceContext>,
) -> Result<RawHtml<String>, ApiError> {
    if token.user.username != username {
        return Err(ApiError::Forbidden(format!("token does not belong to {username}")));
    }
    let images = ctx.prepuller.menu_images().await?;
    Ok(RawHtml(form::generate_user_lab_form(username, &images, &ctx.config)?))
}

pub fn all() -> Vec<rocket::Route> {
    rocket::routes![
        get_lab_users,
        get_userdata,
        post_new_lab,
        delete_user_lab,
        get_user_events,
        get_user_status,
        get_images,
        get_prepulls,
        get_lab_form,
    ]
}
