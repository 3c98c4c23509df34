//! Stable, language-neutral error taxonomy shared by every service.
//! The HTTP edge maps each variant to a status code and a Turkish
//! user-facing message; the variant name itself is the stable code used by
//! API clients and tests.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::workflow::GuardError;
use crate::validation::ValidationReport;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("auth_missing")]
    AuthMissing,
    #[error("auth_invalid")]
    AuthInvalid,
    #[error("pending_approval")]
    PendingApproval,
    #[error("transition_not_defined")]
    TransitionNotDefined,
    #[error("transition_forbidden")]
    TransitionForbidden,
    #[error("assignment_not_allowed")]
    AssignmentNotAllowed,
    #[error("reassign_requires_rejection")]
    ReassignRequiresRejection,
    #[error("invalid_count")]
    InvalidCount,
    #[error("no_eligible_candidates")]
    NoEligibleCandidates,
    #[error("insufficient_candidates")]
    InsufficientCandidates,
    #[error("unknown_strategy")]
    UnknownStrategy,
    #[error("invalid_request: {0}")]
    InvalidRequest(String),
    #[error("validation_failed")]
    ValidationFailed(Box<ValidationReport>),
    #[error("export_access_error")]
    ExportAccessError,
    #[error("export_not_found")]
    ExportNotFound,
    #[error("export_format_unsupported")]
    ExportFormatUnsupported,
    #[error("not_found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        use ServiceError::*;
        match self {
            AuthMissing => StatusCode::UNAUTHORIZED,
            AuthInvalid => StatusCode::UNAUTHORIZED,
            PendingApproval => StatusCode::FORBIDDEN,
            TransitionNotDefined => StatusCode::BAD_REQUEST,
            TransitionForbidden => StatusCode::FORBIDDEN,
            AssignmentNotAllowed => StatusCode::CONFLICT,
            ReassignRequiresRejection => StatusCode::BAD_REQUEST,
            InvalidCount => StatusCode::BAD_REQUEST,
            NoEligibleCandidates => StatusCode::NOT_FOUND,
            InsufficientCandidates => StatusCode::CONFLICT,
            UnknownStrategy => StatusCode::BAD_REQUEST,
            InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ValidationFailed(_) => StatusCode::BAD_REQUEST,
            ExportAccessError => StatusCode::FORBIDDEN,
            ExportNotFound => StatusCode::NOT_FOUND,
            ExportFormatUnsupported => StatusCode::BAD_REQUEST,
            NotFound => StatusCode::NOT_FOUND,
            Conflict => StatusCode::CONFLICT,
            Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Code stamped on the uniform `{ detail }` envelope the HTTP layer
    /// renders; stable and language-neutral regardless of message wording.
    pub fn code(&self) -> &'static str {
        use ServiceError::*;
        match self {
            AuthMissing => "AuthMissing",
            AuthInvalid => "AuthInvalid",
            PendingApproval => "PendingApproval",
            TransitionNotDefined => "TransitionNotDefined",
            TransitionForbidden => "TransitionForbidden",
            AssignmentNotAllowed => "AssignmentNotAllowed",
            ReassignRequiresRejection => "ReassignRequiresRejection",
            InvalidCount => "InvalidCount",
            NoEligibleCandidates => "NoEligibleCandidates",
            InsufficientCandidates => "InsufficientCandidates",
            UnknownStrategy => "UnknownStrategy",
            InvalidRequest(_) => "InvalidRequest",
            ValidationFailed(_) => "ValidationFailed",
            ExportAccessError => "ExportAccessError",
            ExportNotFound => "ExportNotFound",
            ExportFormatUnsupported => "ExportFormatUnsupported",
            NotFound => "NotFound",
            Conflict => "Conflict",
            Internal(_) => "Internal",
        }
    }

    /// User-visible failure message, in Turkish: "User-visible
    /// failure behavior is explicit and in Turkish at the HTTP layer; codes
    /// are language-neutral and stable."
    pub fn detail_tr(&self) -> String {
        use ServiceError::*;
        match self {
            AuthMissing => "Kimlik doğrulama bilgisi eksik.".to_string(),
            AuthInvalid => "Kimlik doğrulama bilgisi geçersiz.".to_string(),
            PendingApproval => "Hesabınız henüz onaylanmadı.".to_string(),
            TransitionNotDefined => "Bu durum geçişi tanımlı değil.".to_string(),
            TransitionForbidden => "Bu işlemi gerçekleştirme yetkiniz yok.".to_string(),
            AssignmentNotAllowed => "Bu cümleye şu anda atama yapılamaz.".to_string(),
            ReassignRequiresRejection => {
                "Yeniden atama için önce bir reddetme incelemesi gereklidir.".to_string()
            }
            InvalidCount => "Geçersiz atama sayısı.".to_string(),
            NoEligibleCandidates => "Uygun aday bulunamadı.".to_string(),
            InsufficientCandidates => "Yeterli sayıda uygun aday yok.".to_string(),
            UnknownStrategy => "Bilinmeyen atama stratejisi.".to_string(),
            InvalidRequest(msg) => format!("Geçersiz istek: {msg}"),
            ValidationFailed(_) => "Gönderilen PENMAN metni doğrulamayı geçemedi.".to_string(),
            ExportAccessError => "Dışa aktarma işlemi için yetkiniz yok.".to_string(),
            ExportNotFound => "Proje bulunamadı.".to_string(),
            ExportFormatUnsupported => "Desteklenmeyen dışa aktarma biçimi.".to_string(),
            NotFound => "Kayıt bulunamadı.".to_string(),
            Conflict => "Bu kayıt zaten mevcut.".to_string(),
            Internal(_) => "Beklenmeyen bir sunucu hatası oluştu.".to_string(),
        }
    }
}

impl From<GuardError> for ServiceError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::TransitionNotDefined { .. } => ServiceError::TransitionNotDefined,
            GuardError::TransitionForbidden { .. } => ServiceError::TransitionForbidden,
            GuardError::AssignmentNotAllowed => ServiceError::AssignmentNotAllowed,
            GuardError::ReassignRequiresRejection => ServiceError::ReassignRequiresRejection,
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_error_maps_to_matching_service_error() {
        let err: ServiceError = GuardError::ReassignRequiresRejection.into();
        assert_eq!(err.code(), "ReassignRequiresRejection");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn every_variant_has_a_turkish_detail() {
        let err = ServiceError::NotFound;
        assert!(!err.detail_tr().is_empty());
    }
}
