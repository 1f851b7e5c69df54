use infer_rs_backend_ref_cpu::RefWorkloadFactory;

infer_rs_backend_tests::define_backend_tests!(ref_cpu_conformance, RefWorkloadFactory::create);
