use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    RateLimited,
    AuthInvalid,
    Timeout,
    ServerOverload,
    EmptyResponse,
    MalformedResponse,
    BadRequest,
    Unavailable,
}

#[derive(Debug, Clone, Error)]
#[error("{}: {message}", kind.user_message())]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl ServiceErrorKind {
    /// Message shown to the caller so they can decide whether to retry.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::RateLimited => {
                "AI service rate limit exceeded. Please try again in a few moments."
            }
            Self::AuthInvalid => {
                "AI service API key invalid or missing. Please check your API configuration."
            }
            Self::Timeout => "AI service request timeout. Please try again.",
            Self::ServerOverload => "AI service is currently overloaded. Please try again later.",
            Self::EmptyResponse => "AI service returned empty response.",
            Self::MalformedResponse => "AI service returned invalid response format.",
            Self::BadRequest => "Bad request to AI service. Please check your input.",
            Self::Unavailable => "AI service failed",
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Timeout | Self::ServerOverload | Self::Unavailable
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no valid JSON structure found in AI response")]
    NoJsonFound,

    #[error("invalid quiz format: {0}")]
    InvalidQuizFormat(String),

    #[error("invalid analysis format: {0}")]
    InvalidAnalysis(String),
}

#[derive(Debug, Clone, Error)]
pub enum QuizError {
    #[error("quiz not found: {0}")]
    QuizNotFound(String),

    #[error("book not found: {0}")]
    BookNotFound(String),

    #[error("progress not found for book: {0}")]
    ProgressNotFound(String),

    #[error("quiz has already been graded: {0}")]
    AlreadyGraded(String),

    #[error("AI service is currently unavailable. Please try again later. Error: {0}")]
    ServiceUnavailable(#[source] ServiceError),

    #[error("AI returned invalid format. Please try again. Error: {0}")]
    MalformedOutput(#[source] ParseError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl QuizError {
    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::QuizNotFound(_) | Self::BookNotFound(_) | Self::ProgressNotFound(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServiceUnavailable(err) => err.is_retryable(),
            Self::MalformedOutput(_) => true,
            _ => false,
        }
    }
}

impl From<ServiceError> for QuizError {
    fn from(err: ServiceError) -> Self {
        Self::ServiceUnavailable(err)
    }
}

impl From<ParseError> for QuizError {
    fn from(err: ParseError) -> Self {
        Self::MalformedOutput(err)
    }
}
