use anyhow::Result;
use infer_rs::backend::WorkloadFactory;
use infer_rs::graph::{
    ConstTensor, FullyConnectedDescriptor, Graph, InputSlotRef, LayerId, LayerKind,
    OutputSlotRef, SliceDescriptor,
};
use infer_rs::runtime::{LoadedNetwork, NetworkOptions};
use infer_rs::tensor::{DataType, TensorInfo};
use infer_rs_backend_faer::FaerWorkloadFactory;
use infer_rs_backend_ref_cpu::RefWorkloadFactory;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn float_info(dims: &[usize]) -> TensorInfo {
    TensorInfo::from_dims(dims, DataType::Float32).unwrap()
}

fn link(graph: &mut Graph, from: LayerId, to: LayerId, slot: usize) -> Result<()> {
    graph.connect(OutputSlotRef::new(from, 0), InputSlotRef::new(to, slot))?;
    Ok(())
}

fn random(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (index, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= 1e-5 * e.abs().max(1.0),
            "element {index}: got {a}, expected {e}"
        );
    }
}

struct Layers {
    slice: LayerId,
    dense: LayerId,
    scale: LayerId,
    shift: LayerId,
}

/// `shift(scale(dense(slice(in0)), in1), in2)` where `in2` broadcasts over the batch.
fn mixed_graph(rng: &mut StdRng) -> Result<(Graph, Layers)> {
    let mut graph = Graph::new();
    let input = graph.add_input_layer(0, "in", float_info(&[2, 3, 4]));
    let factor = graph.add_input_layer(1, "factor", float_info(&[2, 5]));
    let offset = graph.add_input_layer(2, "offset", float_info(&[1, 5]));
    let slice = graph.add_layer(
        LayerKind::Slice(SliceDescriptor::new(vec![0, 1, 0], vec![2, 2, 4])),
        "slice",
    );
    let dense = graph.add_layer(
        LayerKind::FullyConnected {
            descriptor: FullyConnectedDescriptor {
                transpose_weight_matrix: true,
            },
            weights: ConstTensor::from_f32(float_info(&[5, 8]), &random(rng, 40))?,
            bias: Some(ConstTensor::from_f32(float_info(&[5]), &random(rng, 5))?),
        },
        "dense",
    );
    let scale = graph.add_layer(LayerKind::Multiplication, "scale");
    let shift = graph.add_layer(LayerKind::Addition, "shift");
    let out = graph.add_output_layer(0, "out");
    link(&mut graph, input, slice, 0)?;
    link(&mut graph, slice, dense, 0)?;
    link(&mut graph, dense, scale, 0)?;
    link(&mut graph, factor, scale, 1)?;
    link(&mut graph, scale, shift, 0)?;
    link(&mut graph, offset, shift, 1)?;
    link(&mut graph, shift, out, 0)?;
    Ok((
        graph,
        Layers {
            slice,
            dense,
            scale,
            shift,
        },
    ))
}

fn run(
    graph: &Graph,
    factories: Vec<Box<dyn WorkloadFactory>>,
    inputs: &[Vec<f32>],
) -> Result<(LoadedNetwork, Vec<f32>)> {
    let mut network =
        LoadedNetwork::load_with_factories(graph, factories, NetworkOptions::default())?;
    for (binding, values) in inputs.iter().enumerate() {
        network.set_input_f32(binding as i32, values)?;
    }
    network.execute()?;
    let output = network.output_f32(0)?;
    Ok((network, output))
}

#[test]
fn mixed_assignment_matches_reference_backend() -> Result<()> {
    infer_rs_backend_tests::init_tracing();
    let mut rng = StdRng::seed_from_u64(23);
    let (graph, layers) = mixed_graph(&mut rng)?;
    let inputs = vec![random(&mut rng, 24), random(&mut rng, 10), random(&mut rng, 5)];

    let (mixed, accelerated) = run(
        &graph,
        vec![FaerWorkloadFactory::create(), RefWorkloadFactory::create()],
        &inputs,
    )?;
    assert_eq!(mixed.backend_for(layers.slice), Some("faer"));
    assert_eq!(mixed.backend_for(layers.dense), Some("faer"));
    assert_eq!(mixed.backend_for(layers.scale), Some("faer"));
    assert_eq!(mixed.backend_for(layers.shift), Some("cpu-ref"));

    let (_, reference) = run(&graph, vec![RefWorkloadFactory::create()], &inputs)?;
    assert_close(&accelerated, &reference);
    Ok(())
}

#[test]
fn fully_connected_parity_across_shapes() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(5);
    for (batch, inputs, outputs) in [(1, 1, 1), (3, 17, 9), (8, 32, 33)] {
        let weights = random(&mut rng, inputs * outputs);
        let mut graph = Graph::new();
        let input = graph.add_input_layer(0, "in", float_info(&[batch, inputs]));
        let dense = graph.add_layer(
            LayerKind::FullyConnected {
                descriptor: FullyConnectedDescriptor::default(),
                weights: ConstTensor::from_f32(float_info(&[inputs, outputs]), &weights)?,
                bias: None,
            },
            "dense",
        );
        let out = graph.add_output_layer(0, "out");
        link(&mut graph, input, dense, 0)?;
        link(&mut graph, dense, out, 0)?;

        let values = vec![random(&mut rng, batch * inputs)];
        let (_, accelerated) = run(&graph, vec![FaerWorkloadFactory::create()], &values)?;
        let (_, reference) = run(&graph, vec![RefWorkloadFactory::create()], &values)?;
        assert_close(&accelerated, &reference);
    }
    Ok(())
}

#[test]
fn quantized_inputs_are_accepted_but_signed_ones_are_not() {
    let factory = FaerWorkloadFactory::new();
    let quantized = TensorInfo::quantized(
        infer_rs::tensor::TensorShape::new(&[4]).unwrap(),
        DataType::QAsymmU8,
        0.1,
        0,
    );
    assert!(factory
        .is_layer_supported(
            &LayerKind::Addition,
            &[quantized.clone(), quantized.clone()],
            &[quantized]
        )
        .is_supported());

    let signed = TensorInfo::from_dims(&[4], DataType::Signed32).unwrap();
    let support = factory.is_layer_supported(
        &LayerKind::Addition,
        &[signed.clone(), signed.clone()],
        &[signed],
    );
    assert!(support.reason().is_some_and(|reason| reason.contains("Signed32")));
}
