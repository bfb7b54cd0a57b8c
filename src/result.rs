use std::fmt::Display;

use miette::miette;

#[derive(Debug)]
pub enum Error {
    /// The browser session (or its home window) is gone.
    /// Unlike every other error, this one is fatal for the whole pipeline.
    SessionLost,

    Miette(miette::Report),
}

impl From<miette::Report> for Error {
    fn from(err: miette::Report) -> Self {
        Error::Miette(err)
    }
}

impl From<Error> for miette::Report {
    fn from(err: Error) -> Self {
        match err {
            Error::SessionLost => miette!("Browser session lost"),
            Error::Miette(err) => err,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Miette(miette::Report::msg(err))
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Miette(miette::Report::msg(err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Miette(miette::Report::msg(err))
    }
}

impl Error {
    pub fn wrap_err_with<D, F>(self, f: F) -> Error
    where
        D: Display + Send + Sync + 'static,
        F: FnOnce() -> D,
    {
        match self {
            Error::Miette(report) => Error::Miette(report.wrap_err(f())),
            err => err,
        }
    }

    /// Render the task-level failure reason that ends up in the record's
    /// status field. Fatal errors are never recorded, so they have no reason.
    pub fn reason(&self) -> String {
        match self {
            Error::SessionLost => "session lost".to_owned(),
            Error::Miette(report) => report.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub fn bail<T>(msg: impl Display + Send + Sync + 'static) -> Result<T> {
    Err(Error::Miette(miette!("{msg}")))
}
