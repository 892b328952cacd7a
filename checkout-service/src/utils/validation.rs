use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use validator::Validate;

/// JSON body that is deserialized and validated before the handler runs.
///
/// Malformed bodies, unknown enum values and a wrong content type all become
/// `400 bad_request`; field rule violations become `400 validation_error`.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| {
                AppError::BadRequest(anyhow::anyhow!("Invalid request body: {}", e.body_text()))
            })?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct NewPackage {
        #[validate(length(min = 1))]
        name: String,
    }

    fn request(body: &'static str, content_type: &str) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", content_type)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn accepts_valid_body() {
        let ValidatedJson(body) =
            ValidatedJson::<NewPackage>::from_request(request(r#"{"name":"basic"}"#, "application/json"), &())
                .await
                .unwrap();
        assert_eq!(body.name, "basic");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let err = ValidatedJson::<NewPackage>::from_request(request(r#"{"nam":1}"#, "application/json"), &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "bad_request");
    }

    #[tokio::test]
    async fn missing_content_type_is_bad_request() {
        let err = ValidatedJson::<NewPackage>::from_request(request(r#"{"name":"x"}"#, "text/plain"), &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "bad_request");
    }

    #[tokio::test]
    async fn rule_violation_is_validation_error() {
        let err = ValidatedJson::<NewPackage>::from_request(request(r#"{"name":""}"#, "application/json"), &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "validation_error");
    }
}
