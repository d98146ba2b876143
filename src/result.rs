use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
};
use tracing::{error, warn};

/// What went wrong when opening, reading, or decoding a volume. Navigation
/// misses are reported as plain booleans, everything else carries a kind.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub enum VolErrorKind {
    /// The volume itself could not be opened.
    VolumeCreation,
    /// The container exists but has no entry of the requested name.
    EntryNotFound,
    /// Raw bytes of an entry could not be obtained.
    ReadFailure,
    /// Bytes were obtained but are not a decodable image.
    DecodeFailure,
    /// An index-based operation was asked for a page the volume does not have.
    NavigationOutOfRange,
    /// A fault in the ambient machinery, e.g. a worker thread went away.
    Internal,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct VolError {
    kind: VolErrorKind,
    msg: String,
}
impl VolError {
    pub fn new(kind: VolErrorKind, msg: &str) -> VolError {
        VolError {
            kind,
            msg: msg.to_string(),
        }
    }
    pub fn kind(&self) -> VolErrorKind {
        self.kind
    }
    pub fn msg(&self) -> &str {
        &self.msg
    }
}
impl Display for VolError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.msg)
    }
}
impl Error for VolError {}

/// Result type of this crate with [`VolError`](VolError) as error type.
pub type VolResult<U> = Result<U, VolError>;

pub fn trace_ok_err<T, E>(x: Result<T, E>) -> Option<T>
where
    E: Debug,
{
    match x {
        Ok(x) => Some(x),
        Err(e) => {
            error!("{e:?}");
            None
        }
    }
}
pub fn trace_ok_warn<T, E>(x: Result<T, E>) -> Option<T>
where
    E: Debug,
{
    match x {
        Ok(x) => Some(x),
        Err(e) => {
            warn!("{e:?}");
            None
        }
    }
}
/// Creates a [`VolError`](VolError) of the given kind with a formatted message.
/// ```rust
/// # use std::error::Error;
/// use rvolume::{volerr, result::{VolError, VolErrorKind}};
/// # fn main() -> Result<(), Box<dyn Error>> {
/// assert_eq!(
///     volerr!(VolErrorKind::ReadFailure, "some error {}", 1),
///     VolError::new(VolErrorKind::ReadFailure, format!("some error {}", 1).as_str())
/// );
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! volerr {
    ($k:expr, $s:literal) => {
        $crate::result::VolError::new($k, format!($s).as_str())
    };
    ($k:expr, $s:literal, $( $exps:expr ),*) => {
        $crate::result::VolError::new($k, format!($s, $($exps,)*).as_str())
    }
}

/// Converts any debug-printable error into a [`VolError`](VolError) of the given kind.
pub fn to_vol<E: Debug>(kind: VolErrorKind) -> impl Fn(E) -> VolError {
    move |e| {
        volerr!(
            kind,
            "original error type is '{:?}', error message is '{:?}'",
            std::any::type_name::<E>(),
            e
        )
    }
}
