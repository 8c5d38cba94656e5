#![allow(dead_code, unused_imports)]

pub use noteflow_test_utils::builders;
pub use noteflow_test_utils::fake_invoker::FakeInvoker;
pub use noteflow_test_utils::{init_tracing, with_timeout};
