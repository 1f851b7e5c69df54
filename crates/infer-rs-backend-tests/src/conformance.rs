//! Behaviour every backend must show for the layers it accepts.

use anyhow::Result;
use infer_rs::backend::{
    BackendError, Support, TensorHandle, WorkingMemDescriptor, WorkloadFactory, WorkloadInfo,
    WorkloadRequest,
};
use infer_rs::graph::{
    ConstTensor, FullyConnectedDescriptor, Graph, InputSlotRef, LayerId, LayerKind, OperatorKind,
    OutputSlotRef, SliceDescriptor,
};
use infer_rs::runtime::{LoadedNetwork, NetworkOptions, RuntimeError};
use infer_rs::tensor::{DataType, TensorInfo, TensorShape};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::recording::{snapshot, FactoryCall, RecordingFactory};

/// Builds a fresh factory of the backend under test.
pub type FactoryCtor = dyn Fn() -> Box<dyn WorkloadFactory>;

const MULTIPLY_INPUT: [f32; 16] = [
    0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0,
];

fn float_info(dims: &[usize]) -> TensorInfo {
    TensorInfo::from_dims(dims, DataType::Float32).expect("valid dims")
}

fn options() -> NetworkOptions {
    NetworkOptions {
        backend_preferences: Vec::new(),
        validate_memory: true,
    }
}

fn link(graph: &mut Graph, from: LayerId, to: LayerId, slot: usize) -> Result<()> {
    graph.connect(OutputSlotRef::new(from, 0), InputSlotRef::new(to, slot))?;
    Ok(())
}

/// `out0 = kind(in0, in1)`.
fn binary_graph(kind: LayerKind, info: TensorInfo) -> Result<Graph> {
    let mut graph = Graph::new();
    let lhs = graph.add_input_layer(0, "lhs", info.clone());
    let rhs = graph.add_input_layer(1, "rhs", info);
    let op = graph.add_layer(kind, "op");
    let out = graph.add_output_layer(0, "out");
    link(&mut graph, lhs, op, 0)?;
    link(&mut graph, rhs, op, 1)?;
    link(&mut graph, op, out, 0)?;
    Ok(graph)
}

/// `out0 = kind(in0)`.
fn unary_graph(kind: LayerKind, info: TensorInfo) -> Result<Graph> {
    let mut graph = Graph::new();
    let input = graph.add_input_layer(0, "in", info);
    let op = graph.add_layer(kind, "op");
    let out = graph.add_output_layer(0, "out");
    link(&mut graph, input, op, 0)?;
    link(&mut graph, op, out, 0)?;
    Ok(graph)
}

fn load(graph: &Graph, factory: Box<dyn WorkloadFactory>) -> LoadedNetwork {
    LoadedNetwork::load_with_factories(graph, vec![factory], options())
        .expect("backend should load the network")
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (index, (a, e)) in actual.iter().zip(expected).enumerate() {
        let tolerance = 1e-5 * e.abs().max(1.0);
        assert!(
            (a - e).abs() <= tolerance,
            "element {index}: got {a}, expected {e}"
        );
    }
}

pub fn multiply_by_ones_returns_input(make: &FactoryCtor) {
    let graph = binary_graph(LayerKind::Multiplication, float_info(&[1, 1, 4, 4]))
        .expect("graph builds");
    let mut network = load(&graph, make());
    network.set_input_f32(0, &MULTIPLY_INPUT).unwrap();
    network.set_input_f32(1, &[1.0; 16]).unwrap();
    network.execute().unwrap();
    assert_eq!(network.output_f32(0).unwrap(), MULTIPLY_INPUT.to_vec());
}

pub fn quantized_multiply_within_one_step(make: &FactoryCtor) {
    let scale = 0.05;
    let shape = TensorShape::new(&[1, 1, 4, 4]).unwrap();
    let info = TensorInfo::quantized(shape, DataType::QAsymmU8, scale, 3);
    let graph = binary_graph(LayerKind::Multiplication, info).expect("graph builds");
    let mut network = load(&graph, make());

    let mut rng = StdRng::seed_from_u64(7);
    let values: Vec<f32> = (0..16).map(|_| rng.gen_range(0.0..10.0)).collect();
    network.set_input_f32(0, &values).unwrap();
    network.set_input_f32(1, &[1.0; 16]).unwrap();
    network.execute().unwrap();

    let output = network.output_f32(0).unwrap();
    for (got, expected) in output.iter().zip(&values) {
        assert!(
            (got - expected).abs() <= scale + 1e-4,
            "got {got}, expected {expected} within one step"
        );
    }
}

fn multiply_request(info: &TensorInfo) -> WorkloadRequest {
    WorkloadRequest::new(
        "mul",
        LayerKind::Multiplication,
        WorkloadInfo::new(vec![info.clone(), info.clone()], vec![info.clone()]),
    )
}

pub fn create_requires_validation(make: &FactoryCtor) {
    let factory = make();
    let info = float_info(&[2, 2]);
    let mut request = multiply_request(&info);
    let memory = WorkingMemDescriptor::allocate(request.info());

    assert!(matches!(
        factory.create_workload(&request, memory.clone()),
        Err(BackendError::NotValidated { .. })
    ));
    assert_eq!(request.validate_with(factory.as_ref()), Support::Supported);
    let workload = factory
        .create_workload(&request, memory)
        .expect("validated request builds");
    assert_eq!(workload.name(), "mul");

    assert!(matches!(
        factory.is_layer_supported(&LayerKind::Multiplication, &[info.clone()], &[info.clone()]),
        Support::Malformed(_)
    ));
    assert!(matches!(
        factory.is_layer_supported(
            &LayerKind::Multiplication,
            &[info.clone(), info.clone()],
            &[TensorInfo::default()]
        ),
        Support::Malformed(_)
    ));
    assert!(!factory
        .is_layer_supported(&LayerKind::Input { binding: 0 }, &[], &[info])
        .is_supported());
}

pub fn create_rejects_mismatched_memory(make: &FactoryCtor) {
    let factory = make();
    let info = float_info(&[2, 2]);
    let mut request = multiply_request(&info);
    assert!(request.validate_with(factory.as_ref()).is_supported());

    let wrong_shape = WorkingMemDescriptor::new(
        vec![
            TensorHandle::allocate(float_info(&[4])),
            TensorHandle::allocate(info.clone()),
        ],
        vec![TensorHandle::allocate(info.clone())],
    );
    assert!(matches!(
        factory.create_workload(&request, wrong_shape),
        Err(BackendError::Malformed { .. })
    ));

    let missing_output = WorkingMemDescriptor::new(
        vec![
            TensorHandle::allocate(info.clone()),
            TensorHandle::allocate(info),
        ],
        Vec::new(),
    );
    assert!(matches!(
        factory.create_workload(&request, missing_output),
        Err(BackendError::Malformed { .. })
    ));
}

fn reference_fully_connected(
    input: &[f32],
    weights: &[f32],
    bias: &[f32],
    batch: usize,
    inputs: usize,
    outputs: usize,
    transposed: bool,
) -> Vec<f32> {
    let mut result = vec![0.0; batch * outputs];
    for b in 0..batch {
        for o in 0..outputs {
            let mut acc = bias[o];
            for i in 0..inputs {
                let w = if transposed {
                    weights[o * inputs + i]
                } else {
                    weights[i * outputs + o]
                };
                acc += input[b * inputs + i] * w;
            }
            result[b * outputs + o] = acc;
        }
    }
    result
}

pub fn fully_connected_matches_expected(make: &FactoryCtor) {
    let (batch, inputs, outputs) = (2, 3, 4);
    let mut rng = StdRng::seed_from_u64(11);
    let input: Vec<f32> = (0..batch * inputs).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let weights: Vec<f32> = (0..inputs * outputs).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let bias: Vec<f32> = (0..outputs).map(|_| rng.gen_range(-1.0..1.0)).collect();

    for transposed in [false, true] {
        let weight_dims = if transposed {
            [outputs, inputs]
        } else {
            [inputs, outputs]
        };
        let kind = LayerKind::FullyConnected {
            descriptor: FullyConnectedDescriptor {
                transpose_weight_matrix: transposed,
            },
            weights: ConstTensor::from_f32(float_info(&weight_dims), &weights).unwrap(),
            bias: Some(ConstTensor::from_f32(float_info(&[outputs]), &bias).unwrap()),
        };
        let graph = unary_graph(kind, float_info(&[batch, inputs])).expect("graph builds");
        let mut network = load(&graph, make());
        network.set_input_f32(0, &input).unwrap();
        network.execute().unwrap();
        let expected =
            reference_fully_connected(&input, &weights, &bias, batch, inputs, outputs, transposed);
        assert_close(&network.output_f32(0).unwrap(), &expected);
    }
}

pub fn slice_extracts_window(make: &FactoryCtor) {
    let dims = [2, 3, 4];
    let (begin, size) = (vec![0, 1, 1], vec![2, 2, 3]);
    let input: Vec<f32> = (0..24).map(|v| v as f32).collect();
    let kind = LayerKind::Slice(SliceDescriptor::new(begin.clone(), size.clone()));
    let graph = unary_graph(kind, float_info(&dims)).expect("graph builds");
    let mut network = load(&graph, make());
    network.set_input_f32(0, &input).unwrap();
    network.execute().unwrap();

    let mut expected = Vec::new();
    for a in begin[0]..begin[0] + size[0] {
        for b in begin[1]..begin[1] + size[1] {
            for c in begin[2]..begin[2] + size[2] {
                expected.push(input[(a * dims[1] + b) * dims[2] + c]);
            }
        }
    }
    assert_eq!(network.output_f32(0).unwrap(), expected);
}

pub fn execute_async_uses_caller_memory(make: &FactoryCtor) {
    let graph =
        binary_graph(LayerKind::Multiplication, float_info(&[2, 3])).expect("graph builds");
    let mut network = load(&graph, make());
    network.set_input_f32(0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    network.set_input_f32(1, &[2.0; 6]).unwrap();
    network.execute().unwrap();

    let mut first = network.create_working_memory();
    first.set_input_f32(0, &[1.0; 6]).unwrap();
    first.set_input_f32(1, &[3.0; 6]).unwrap();
    let mut second = network.create_working_memory();
    second.set_input_f32(0, &[-1.0; 6]).unwrap();
    second.set_input_f32(1, &[0.5; 6]).unwrap();

    network.execute_async(&first).unwrap();
    network.execute_async(&second).unwrap();

    assert_eq!(first.output_f32(0).unwrap(), vec![3.0; 6]);
    assert_eq!(second.output_f32(0).unwrap(), vec![-0.5; 6]);
    assert_eq!(
        network.output_f32(0).unwrap(),
        vec![2.0, 4.0, 6.0, 8.0, 10.0, 12.0]
    );
}

pub fn factory_calls_follow_topological_order(make: &FactoryCtor) {
    let info = float_info(&[4]);
    let mut graph = Graph::new();
    let input = graph.add_input_layer(0, "in", info);
    let square = graph.add_layer(LayerKind::Multiplication, "square");
    let shift = graph.add_layer(LayerKind::Addition, "shift");
    let out = graph.add_output_layer(0, "out");
    link(&mut graph, input, square, 0).unwrap();
    link(&mut graph, input, square, 1).unwrap();
    link(&mut graph, square, shift, 0).unwrap();
    link(&mut graph, input, shift, 1).unwrap();
    link(&mut graph, shift, out, 0).unwrap();

    let recording = RecordingFactory::wrapping(make());
    let log = recording.log();
    let mut network = load(&graph, Box::new(recording));
    assert_eq!(
        snapshot(&log),
        vec![
            FactoryCall::Validate(OperatorKind::Multiplication),
            FactoryCall::Create {
                layer: "square".to_string(),
                operator: OperatorKind::Multiplication,
            },
            FactoryCall::Validate(OperatorKind::Addition),
            FactoryCall::Create {
                layer: "shift".to_string(),
                operator: OperatorKind::Addition,
            },
        ]
    );

    network.set_input_f32(0, &[1.0, 2.0, 3.0, -1.0]).unwrap();
    network.execute().unwrap();
    assert_eq!(network.output_f32(0).unwrap(), vec![2.0, 6.0, 12.0, 0.0]);
}

fn fully_connected(weights: ConstTensor, bias: Option<ConstTensor>) -> LayerKind {
    LayerKind::FullyConnected {
        descriptor: FullyConnectedDescriptor::default(),
        weights,
        bias,
    }
}

pub fn fully_connected_rejects_bias_mismatch(make: &FactoryCtor) {
    let factory = make();
    let weights = ConstTensor::from_f32(float_info(&[3, 2]), &[1.0; 6]).unwrap();
    for bias_dims in [[3], [1]] {
        let bias = ConstTensor::from_f32(float_info(&bias_dims), &vec![0.5; bias_dims[0]])
            .unwrap();
        let kind = fully_connected(weights.clone(), Some(bias));
        assert!(matches!(
            factory.is_layer_supported(&kind, &[float_info(&[1, 3])], &[float_info(&[1, 2])]),
            Support::Malformed(_)
        ));
    }
}

pub fn fully_connected_rejects_zero_extents(make: &FactoryCtor) {
    let factory = make();
    let weights = ConstTensor::from_f32(float_info(&[0, 2]), &[]).unwrap();
    let kind = fully_connected(weights, None);
    assert!(matches!(
        factory.is_layer_supported(&kind, &[float_info(&[1, 0])], &[float_info(&[1, 2])]),
        Support::Malformed(_)
    ));
}

pub fn slice_rejects_overflowing_window(make: &FactoryCtor) {
    let factory = make();
    let kind = LayerKind::Slice(SliceDescriptor::new(vec![usize::MAX], vec![2]));
    assert!(matches!(
        factory.is_layer_supported(&kind, &[float_info(&[4])], &[float_info(&[2])]),
        Support::Malformed(_)
    ));
}

pub fn per_axis_quantized_slice_executes(make: &FactoryCtor) {
    let factory = make();
    let shape = TensorShape::new(&[2, 3]).unwrap();
    let input = TensorInfo::per_axis(shape, DataType::QSymmS8, vec![0.5, 2.0], 0).unwrap();
    let output = float_info(&[2, 2]);
    let mut request = WorkloadRequest::new(
        "slice",
        LayerKind::Slice(SliceDescriptor::new(vec![0, 1], vec![2, 2])),
        WorkloadInfo::new(vec![input], vec![output]),
    );
    assert_eq!(request.validate_with(factory.as_ref()), Support::Supported);

    let memory = WorkingMemDescriptor::allocate(request.info());
    // Row 0 steps by 0.5 and row 1 by 2.0.
    memory.inputs[0]
        .write_f32(&[0.5, -1.0, 1.5, 2.0, -4.0, 6.0])
        .unwrap();
    let mut workload = factory
        .create_workload(&request, memory.clone())
        .expect("validated request builds");
    workload.configure().unwrap();
    workload.execute().unwrap();
    assert_eq!(memory.outputs[0].read_f32().unwrap(), vec![-1.0, 1.5, -4.0, 6.0]);
}

pub fn duplicate_bindings_fail_to_load(make: &FactoryCtor) {
    let info = float_info(&[2]);
    let mut graph = binary_graph(LayerKind::Addition, info.clone()).expect("graph builds");
    graph.add_input_layer(1, "rhs_again", info);
    let err = LoadedNetwork::load_with_factories(&graph, vec![make()], options())
        .err()
        .expect("second input with binding 1 is refused");
    assert!(matches!(
        err,
        RuntimeError::DuplicateBinding {
            direction: "input",
            binding: 1
        }
    ));
}
