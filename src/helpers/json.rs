use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::{web, Error, HttpResponse};
use serde::Serialize;

/// Envelope shared by every REST response
#[derive(Serialize)]
pub(crate) struct JsonResponse<T> {
    pub(crate) status: String,
    pub(crate) message: String,
    pub(crate) code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) item: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) list: Option<Vec<T>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) total: Option<usize>,
}

pub(crate) struct JsonResponseBuilder<T> {
    item: Option<T>,
    list: Option<Vec<T>>,
    total: Option<usize>,
}

impl<T> Default for JsonResponseBuilder<T> {
    fn default() -> Self {
        Self {
            item: None,
            list: None,
            total: None,
        }
    }
}

impl<T: Serialize> JsonResponseBuilder<T> {
    pub(crate) fn set_item(mut self, item: T) -> Self {
        self.item = Some(item);
        self
    }

    pub(crate) fn set_list(mut self, list: Vec<T>) -> Self {
        self.list = Some(list);
        self
    }

    /// Size of the whole collection when `list` is one page of it
    pub(crate) fn set_total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }

    fn to_json_response(self, code: StatusCode, message: &str) -> JsonResponse<T> {
        let status = if code.is_success() { "OK" } else { "Error" };
        let message = if message.trim().is_empty() {
            code.canonical_reason().unwrap_or("").to_string()
        } else {
            message.to_string()
        };

        JsonResponse {
            status: status.to_string(),
            message,
            code: code.as_u16(),
            item: self.item,
            list: self.list,
            total: self.total,
        }
    }

    pub(crate) fn ok(self, message: &str) -> web::Json<JsonResponse<T>> {
        web::Json(self.to_json_response(StatusCode::OK, message))
    }

    pub(crate) fn created(self, message: &str) -> HttpResponse {
        HttpResponse::Created().json(self.to_json_response(StatusCode::CREATED, message))
    }

    fn error(self, code: StatusCode, message: &str) -> Error {
        let body = self.to_json_response(code, message);
        InternalError::from_response("", HttpResponse::build(code).json(body)).into()
    }

    pub(crate) fn bad_request(self, message: &str) -> Error {
        self.error(StatusCode::BAD_REQUEST, message)
    }

    pub(crate) fn form_error(self, message: String) -> Error {
        self.error(StatusCode::BAD_REQUEST, &message)
    }
}

impl<T: Serialize> JsonResponse<T> {
    pub(crate) fn build() -> JsonResponseBuilder<T> {
        JsonResponseBuilder::default()
    }
}
