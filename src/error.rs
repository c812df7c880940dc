//! Errors reported while building a SINT route.

use core::fmt;

use axerrno::AxError;

/// Reasons [`create_sint_route`](crate::SintRouteManager::create_sint_route) can fail.
///
/// Every variant is recoverable: nothing acquired during the failed attempt is
/// left behind, so the caller may retry or propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SintRouteError {
    /// The virtual processor index does not name a known vCPU.
    VcpuNotFound,
    /// The host could not allocate a notification primitive.
    ResourceExhausted(AxError),
    /// No routing slot is left.
    RoutingFull,
    /// The (vp, sint) pair already owns a routing slot.
    RoutingConflict,
    /// The notifiers could not be bound to the routing slot.
    BindError(AxError),
}

impl SintRouteError {
    /// Classifies a routing slot allocation failure.
    pub(crate) fn from_alloc(err: AxError) -> Self {
        match err {
            AxError::AlreadyExists => Self::RoutingConflict,
            _ => Self::RoutingFull,
        }
    }
}

impl fmt::Display for SintRouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VcpuNotFound => write!(f, "virtual processor not found"),
            Self::ResourceExhausted(err) => write!(f, "notifier allocation failed: {err:?}"),
            Self::RoutingFull => write!(f, "no free interrupt routing slot"),
            Self::RoutingConflict => write!(f, "sint already has a routing slot"),
            Self::BindError(err) => write!(f, "failed to bind notifiers: {err:?}"),
        }
    }
}

impl From<SintRouteError> for AxError {
    fn from(err: SintRouteError) -> Self {
        match err {
            SintRouteError::VcpuNotFound => AxError::NotFound,
            SintRouteError::ResourceExhausted(_) => AxError::NoMemory,
            SintRouteError::RoutingFull => AxError::StorageFull,
            SintRouteError::RoutingConflict => AxError::AlreadyExists,
            SintRouteError::BindError(err) => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_error_classification() {
        assert_eq!(
            SintRouteError::from_alloc(AxError::AlreadyExists),
            SintRouteError::RoutingConflict
        );
        assert_eq!(
            SintRouteError::from_alloc(AxError::NoMemory),
            SintRouteError::RoutingFull
        );
        assert_eq!(
            SintRouteError::from_alloc(AxError::StorageFull),
            SintRouteError::RoutingFull
        );
    }

    #[test]
    fn test_into_ax_error() {
        assert_eq!(AxError::from(SintRouteError::VcpuNotFound), AxError::NotFound);
        assert_eq!(
            AxError::from(SintRouteError::BindError(AxError::BadState)),
            AxError::BadState
        );
    }
}
