//! Batch hydration for a GraphQL federation gateway.
//!
//! A hydrated field is resolved out of band: the values needed to find it are
//! read from the owning service's response, sent in batches to a backing
//! service, and the resolved objects are spliced back into the response tree.

#![cfg_attr(feature = "failfast", allow(unreachable_code))]
#![warn(unreachable_pub)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

pub mod json_ext;

pub mod blueprint;
pub mod configuration;
pub mod error;
pub mod graphql;
pub mod hydration;
pub mod query;
pub mod services;

pub use blueprint::Blueprint;
pub use configuration::Configuration;
pub use hydration::BatchHydrationTransform;
pub use hydration::ResultInstruction;
pub use services::ServiceRegistry;
