pub mod conformance;
pub mod recording;

/// Installs a test-writer subscriber filtered by `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Instantiates the conformance suite for one backend.
///
/// `$factory_ctor` is any expression callable as `() -> Box<dyn WorkloadFactory>`.
#[macro_export]
macro_rules! define_backend_tests {
    ($module:ident, $factory_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            #[allow(unused_imports)]
            use super::*;
            use $crate::conformance;

            macro_rules! conformance_test {
                ($name:ident) => {
                    #[test]
                    fn $name() {
                        $crate::init_tracing();
                        conformance::$name(&|| ($factory_ctor)());
                    }
                };
            }

            conformance_test!(multiply_by_ones_returns_input);
            conformance_test!(quantized_multiply_within_one_step);
            conformance_test!(create_requires_validation);
            conformance_test!(create_rejects_mismatched_memory);
            conformance_test!(fully_connected_matches_expected);
            conformance_test!(slice_extracts_window);
            conformance_test!(execute_async_uses_caller_memory);
            conformance_test!(factory_calls_follow_topological_order);
            conformance_test!(fully_connected_rejects_bias_mismatch);
            conformance_test!(fully_connected_rejects_zero_extents);
            conformance_test!(slice_rejects_overflowing_window);
            conformance_test!(per_axis_quantized_slice_executes);
            conformance_test!(duplicate_bindings_fail_to_load);
        }
    };
}
