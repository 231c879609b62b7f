/// The error type for the fallible operations of [`NonBlockingMap`][map] and
/// [`NonBlockingSet`][set].
///
/// A conditional write that does not match the current state of an entry is
/// not an error. Such operations return `false` or `None` instead.
///
/// [map]: ./struct.NonBlockingMap.html
/// [set]: ./struct.NonBlockingSet.html
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The key was not present in the map.
    ///
    /// Returned by [`NonBlockingMap::try_get`][try-get].
    ///
    /// [try-get]: ./struct.NonBlockingMap.html#method.try_get
    #[error("The given key was not present in the map")]
    KeyNotFound,

    /// The operation is not supported by this collection. The payload is the
    /// name of the operation.
    #[error("The operation `{0}` is not supported by a non-blocking set")]
    Unsupported(&'static str),
}
