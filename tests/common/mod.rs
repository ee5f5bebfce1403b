#![allow(dead_code, unused_imports)]

pub use assetdag_test_utils::builders;
pub use assetdag_test_utils::fake_operator;
pub use assetdag_test_utils::{
    fake_registry, id_of, init_tracing, outcome_of, pipeline_from_toml, run_with_workers,
    with_timeout,
};

use std::error::Error;

pub type TestResult = Result<(), Box<dyn Error>>;
