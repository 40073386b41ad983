use derive_more::From;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    // -- Configuration
    InvalidDomain(String),
    InvalidEngineTemplate(String),
    InvalidConfig(String),
    CliUsage(String),

    // -- Network
    InvalidHttpResponse(String),

    // -- Externals
    #[from]
    SystemTime(std::time::SystemTimeError),

    #[from]
    File(std::io::Error),

    #[from]
    Fmt(std::fmt::Error),

    #[from]
    Json(serde_json::Error),

    #[from]
    Utf8(std::string::FromUtf8Error),

    #[from]
    Reqwest(reqwest::Error),
}

// region:    --- Error Boilerplate

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}

// endregion: --- Error Boilerplate
