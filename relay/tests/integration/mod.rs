#![cfg(feature = "test-utils")]

mod async_pipeline_test;
mod bootstrap_test;
mod sync_pipeline_test;
