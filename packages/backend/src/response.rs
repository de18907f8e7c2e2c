use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::analytics::AnalyticsError;
use crate::services::lessons::LessonError;
use crate::services::llm_provider::LLMError;
use crate::services::plan::PlanError;
use crate::services::quizzes::QuizError;
use crate::services::reviews::ReviewError;
use crate::services::tutor::TutorError;

#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<SuccessResponse<T>> {
    Json(SuccessResponse {
        success: true,
        data,
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    is_operational: bool,
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::CONFLICT, "CONFLICT", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            is_operational: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    fn operational(
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            is_operational: true,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = if self.is_operational {
            self.message
        } else {
            tracing::error!(code = %self.code, error = %self.message, "request failed");
            "Internal server error".to_string()
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: self.code,
        };

        (self.status, Json(body)).into_response()
    }
}

pub fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> AppError {
    AppError {
        status,
        code: code.into(),
        message: message.into(),
        is_operational: true,
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::internal(format!("database error: {err}"))
    }
}

impl From<PlanError> for AppError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::FeatureLocked { .. } => {
                json_error(StatusCode::FORBIDDEN, "PLAN_REQUIRED", err.to_string())
            }
            PlanError::QuotaExceeded { .. } => {
                json_error(StatusCode::TOO_MANY_REQUESTS, "QUOTA_EXCEEDED", err.to_string())
            }
            PlanError::InvalidTier(_)
            | PlanError::InvalidStatus(_)
            | PlanError::InvalidUserId(_) => {
                AppError::validation(err.to_string())
            }
            PlanError::Sql(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<LessonError> for AppError {
    fn from(err: LessonError) -> Self {
        match err {
            LessonError::Validation(_) => AppError::validation(err.to_string()),
            LessonError::NotFound(_) => AppError::not_found(err.to_string()),
            LessonError::Plan(plan) => plan.into(),
            LessonError::Sql(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<ReviewError> for AppError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::Validation(_) => AppError::validation(err.to_string()),
            ReviewError::NotFound(_) => AppError::not_found(err.to_string()),
            ReviewError::Lesson(lesson) => lesson.into(),
            ReviewError::Sql(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<QuizError> for AppError {
    fn from(err: QuizError) -> Self {
        match err {
            QuizError::Validation(_) => AppError::validation(err.to_string()),
            QuizError::NotFound(_) => AppError::not_found(err.to_string()),
            QuizError::AlreadySubmitted => AppError::conflict(err.to_string()),
            QuizError::Plan(plan) => plan.into(),
            QuizError::Lesson(lesson) => lesson.into(),
            QuizError::Review(review) => review.into(),
            QuizError::Sql(_) | QuizError::Json(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<TutorError> for AppError {
    fn from(err: TutorError) -> Self {
        match err {
            TutorError::Validation(_) => AppError::validation(err.to_string()),
            TutorError::Plan(plan) => plan.into(),
            TutorError::Llm(LLMError::NotConfigured(_)) => {
                AppError::service_unavailable("Tutor is not available right now")
            }
            TutorError::Llm(ref llm) => {
                tracing::warn!(error = %llm, "tutor upstream failure");
                json_error(
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "Tutor could not answer, please try again",
                )
            }
            TutorError::Sql(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<AnalyticsError> for AppError {
    fn from(err: AnalyticsError) -> Self {
        match err {
            AnalyticsError::Plan(plan) => plan.into(),
            AnalyticsError::Sql(sql) => sql.into(),
        }
    }
}
