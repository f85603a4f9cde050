#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ContentType {
    HTML,
    Plain,
    JSON,
    JSONP,
}

impl ContentType {
    pub const fn as_str(&self) -> &str {
        match self {
            Self::HTML => "text/html; charset=utf-8",
            Self::Plain => "text/plain; charset=utf-8",
            Self::JSON => "application/json",
            Self::JSONP => "application/javascript",
        }
    }
}
