use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Form, FromRequest, Multipart, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use bytes::Bytes;
use serde_json::{Value, json};

use crate::decode::ImageSource;
use crate::engine::{EngineError, Recognition, RecognitionOptions};
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;

const MALFORMED_FORM: &str = "Malformed form data";

/// Raw `POST /ocr` form fields.
///
/// Nothing is validated here beyond the body being a well-formed form;
/// the handler decides what is missing or wrong, in a fixed order.
#[derive(Debug, Default, Clone)]
pub struct OcrForm {
    pub auth_token: Option<String>,
    pub file: Option<Bytes>,
    pub img_b64: Option<String>,
    pub probability: Option<String>,
    pub png_fix: Option<String>,
}

impl OcrForm {
    fn set_text(&mut self, name: &str, value: String) {
        match name {
            "auth_token" => self.auth_token = Some(value),
            "img_b64" => self.img_b64 = Some(value),
            "probability" => self.probability = Some(value),
            "png_fix" => self.png_fix = Some(value),
            "file" => self.file = Some(Bytes::from(value)),
            _ => {}
        }
    }

    async fn from_multipart(mut multipart: Multipart) -> ServerResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| form_rejection(e.status()))?
        {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };

            if name == "file" {
                let data = field.bytes().await.map_err(|e| form_rejection(e.status()))?;
                form.file = Some(data);
            } else {
                let text = field.text().await.map_err(|e| form_rejection(e.status()))?;
                form.set_text(&name, text);
            }
        }

        Ok(form)
    }

    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut form = Self::default();
        for (name, value) in pairs {
            form.set_text(&name, value);
        }
        form
    }
}

impl<S> FromRequest<S> for OcrForm
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| form_rejection(e.status()))?;
            Self::from_multipart(multipart).await
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| form_rejection(e.status()))?;
            Ok(Self::from_pairs(pairs))
        } else {
            // No form at all: every field is absent and the token check fails.
            Ok(Self::default())
        }
    }
}

fn form_rejection(status: StatusCode) -> ServerError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge
    } else {
        ServerError::BadRequest(MALFORMED_FORM.to_string())
    }
}

/// Parse an optional boolean form field; absent or empty means `false`.
pub fn parse_flag(field: &str, raw: Option<&str>) -> ServerResult<bool> {
    let Some(raw) = raw else {
        return Ok(false);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "no" | "off" | "f" | "n" => Ok(false),
        "true" | "1" | "yes" | "on" | "t" | "y" => Ok(true),
        _ => Err(ServerError::BadRequest(format!(
            "Invalid boolean value for field '{field}'"
        ))),
    }
}

/// Run recognition over one uploaded image.
///
/// Checks run in a fixed order: token, image source, flags, image decode.
/// Decoding and recognition both happen on the blocking pool.
///
/// # Response
///
/// ```json
/// { "ocr_result": "x7k2" }
/// ```
///
/// or, when the engine returns structured output (probability mode), that
/// object verbatim.
pub async fn recognize(
    State(state): State<Arc<ServerState>>,
    form: OcrForm,
) -> ServerResult<Json<Value>> {
    if !state.is_authorized(form.auth_token.as_deref()) {
        return Err(ServerError::Unauthorized);
    }

    let source =
        ImageSource::from_parts(form.file, form.img_b64).ok_or(ServerError::SourceConflict)?;

    let options = RecognitionOptions {
        probability: parse_flag("probability", form.probability.as_deref())?,
        png_fix: parse_flag("png_fix", form.png_fix.as_deref())?,
    };

    let source_kind = match &source {
        ImageSource::File(_) => "file",
        ImageSource::Base64(_) => "img_b64",
    };
    let start = Instant::now();
    let recognizer = Arc::clone(&state.recognizer);

    let recognition = tokio::task::spawn_blocking(move || -> ServerResult<Recognition> {
        let image = source.decode()?;
        Ok(recognizer.classify(&image, options)?)
    })
    .await
    .map_err(|e| EngineError::Worker(e.to_string()))??;

    tracing::info!(
        source = source_kind,
        probability = options.probability,
        png_fix = options.png_fix,
        duration_ms = %start.elapsed().as_millis(),
        "Recognition finished"
    );

    match recognition {
        Recognition::Text(text) => Ok(Json(json!({ "ocr_result": text }))),
        Recognition::Structured(map) => Ok(Json(Value::Object(map))),
        Recognition::Unrecognized => Err(ServerError::UnknownOutput),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(!parse_flag("probability", None).unwrap());
        assert!(!parse_flag("probability", Some("")).unwrap());
        assert!(parse_flag("probability", Some("true")).unwrap());
        assert!(parse_flag("probability", Some("TRUE")).unwrap());
        assert!(parse_flag("probability", Some(" 1 ")).unwrap());
        assert!(parse_flag("png_fix", Some("on")).unwrap());
        assert!(!parse_flag("png_fix", Some("off")).unwrap());
        assert!(!parse_flag("png_fix", Some("0")).unwrap());

        let err = parse_flag("png_fix", Some("maybe")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid boolean value for field 'png_fix'");
    }

    #[test]
    fn test_pairs_last_value_wins_and_unknown_ignored() {
        let form = OcrForm::from_pairs(vec![
            ("auth_token".into(), "first".into()),
            ("auth_token".into(), "second".into()),
            ("img_b64".into(), "aGk=".into()),
            ("colour".into(), "blue".into()),
        ]);
        assert_eq!(form.auth_token.as_deref(), Some("second"));
        assert_eq!(form.img_b64.as_deref(), Some("aGk="));
        assert!(form.file.is_none());
        assert!(form.probability.is_none());
    }
}
