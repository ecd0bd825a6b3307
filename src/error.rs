use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// Which stage of a run failed. Anything reaching `main` is fatal.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("invalid configuration")]
    Config,
    #[display("cannot open the cache")]
    Cache,
    #[display("no metadata provider")]
    Metadata,
    #[display("library is unusable")]
    Library,
    #[display("scan aborted")]
    Scan,
    #[display("import aborted")]
    Import,
    #[display("date fix aborted")]
    FixDates,
    #[display("organize aborted")]
    Organize,
}
