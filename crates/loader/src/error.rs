use thiserror::Error;

/// Boundary errors that can arise while constructing nodes during an apply. These are always
/// converted into a single-entry `Diagnostic` before being handed back to the caller; `Loader`
/// itself never returns a `Result`; see the `Apply` contract.
#[derive(Error, Debug)]
pub enum LoaderError {
  #[error("factory for \"{id}\" failed: {reason}")]
  FactoryFailed { id: String, reason: String },
}
