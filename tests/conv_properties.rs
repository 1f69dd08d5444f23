use cfu_conv::kernel::reference::{conv_per_channel_i16, conv_per_channel_i8};
use cfu_conv::utils::log::init_log;
use cfu_conv::{
  conv_per_channel, Cfu, CfuModel, ConvParams, ConvScratch, MatMul, PerChannelQuantization, ScalarGemm, TensorShape,
  TiledGemm,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct Layer {
  params: ConvParams,
  quant: PerChannelQuantization,
  input_shape: TensorShape,
  input: Vec<i8>,
  filter_shape: TensorShape,
  filter: Vec<i8>,
  bias: Option<Vec<i32>>,
  output_shape: TensorShape,
}

impl Layer {
  fn groups(&self) -> usize {
    self.input_shape.channel / self.filter_shape.channel
  }

  fn run<E: MatMul>(&self, engine: &mut E) -> Vec<i8> {
    let mut output = vec![0i8; self.output_shape.flat_size()];
    conv_per_channel(
      &self.params,
      &self.quant,
      &self.input_shape,
      &self.input,
      &self.filter_shape,
      &self.filter,
      self.bias.as_deref(),
      &self.output_shape,
      &mut output,
      engine,
      &mut ConvScratch::new(),
    )
    .unwrap();
    output
  }

  fn reference(&self) -> Vec<i8> {
    let mut output = vec![0i8; self.output_shape.flat_size()];
    conv_per_channel_i8(
      &self.params,
      &self.quant,
      &self.input_shape,
      &self.input,
      &self.filter_shape,
      &self.filter,
      self.bias.as_deref(),
      &self.output_shape,
      &mut output,
    )
    .unwrap();
    output
  }
}

fn activation_range() -> impl Strategy<Value = (i32, i32)> {
  prop_oneof![
    Just((i8::MIN as i32, i8::MAX as i32)),
    (-128i32..=0).prop_flat_map(|lo| (Just(lo), lo..=127)),
  ]
}

/// Geometry first (groups, kernel, stride, dilation, padding), then data sized to it.
fn layer_strategy() -> impl Strategy<Value = Layer> {
  (
    (1usize..=3, 1usize..=3, 1usize..=3),
    (1usize..=3, 1usize..=3),
    (1usize..=2, 1usize..=2, 1usize..=2, 1usize..=2),
    (0usize..=2, 0usize..=2),
    (0usize..=4, 0usize..=4, 1usize..=2),
  )
    .prop_flat_map(
      |((groups, filter_in, per_group), (kh, kw), (sh, sw, dh, dw), (ph, pw), (extra_h, extra_w, batches))| {
        let geometry = ConvParams {
          stride_height: sh,
          stride_width: sw,
          dilation_height: dh,
          dilation_width: dw,
          pad_height: ph,
          pad_width: pw,
          ..Default::default()
        };
        let input_shape = TensorShape::new(
          batches,
          (kh - 1) * dh + 1 + extra_h,
          (kw - 1) * dw + 1 + extra_w,
          groups * filter_in,
        );
        let filter_shape = TensorShape::new(groups * per_group, kh, kw, filter_in);
        let depth = filter_shape.batch;
        (
          Just((geometry, input_shape, filter_shape)),
          -127i32..=128,
          -20i32..=20,
          activation_range(),
          prop::collection::vec(any::<i8>(), input_shape.flat_size()),
          prop::collection::vec(any::<i8>(), filter_shape.flat_size()),
          prop::collection::vec((1i32 << 30)..=i32::MAX, depth),
          prop::collection::vec(-10i32..=1, depth),
          prop::option::of(prop::collection::vec(-5000i32..=5000, depth)),
        )
      },
    )
    .prop_map(
      |(
        (geometry, input_shape, filter_shape),
        input_offset,
        output_offset,
        (activation_min, activation_max),
        input,
        filter,
        multiplier,
        shift,
        bias,
      )| {
        let params = ConvParams {
          input_offset,
          output_offset,
          activation_min,
          activation_max,
          ..geometry
        };
        let output_shape = params.output_shape(&input_shape, &filter_shape).unwrap();
        Layer {
          params,
          quant: PerChannelQuantization::new(multiplier, shift),
          input_shape,
          input,
          filter_shape,
          filter,
          bias,
          output_shape,
        }
      },
    )
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(if cfg!(feature = "smoke-tests") { 2048 } else { 96 }))]

  #[test]
  fn test_cfu_matches_reference(layer in layer_strategy()) {
    init_log();
    let expected = layer.reference();
    let cfu = Cfu::new(CfuModel::new());
    prop_assert_eq!(&layer.run(&mut TiledGemm::new(&cfu)), &expected);
    prop_assert_eq!(&layer.run(&mut ScalarGemm), &expected);
  }

  #[test]
  fn test_tile_width_never_changes_result(layer in layer_strategy(), hw_tile in 1usize..=8) {
    let expected = layer.reference();
    let cfu = Cfu::new(CfuModel::with_tile(hw_tile));
    let rows = layer.output_shape.height * layer.output_shape.width;
    let per_group = layer.filter_shape.batch / layer.groups();
    for tile in 1..=hw_tile {
      let mut gemm = TiledGemm::with_tile(&cfu, tile).unwrap();
      prop_assert_eq!(&layer.run(&mut gemm), &expected, "tile {}", tile);
      let bursts = rows.div_ceil(tile) * per_group.div_ceil(tile) * layer.groups() * layer.input_shape.batch;
      prop_assert_eq!(gemm.total_stats().starts, bursts as u64);
    }
  }

  #[test]
  fn test_full_width_unit_matches_small_tiles(
    input in prop::collection::vec(any::<i8>(), 2 * 6 * 5 * 4),
    filter in prop::collection::vec(any::<i8>(), 6 * 3 * 2 * 2),
  ) {
    let input_shape = TensorShape::new(2, 6, 5, 4);
    let filter_shape = TensorShape::new(6, 3, 2, 2);
    let params = ConvParams {
      pad_height: 1,
      input_offset: 3,
      output_offset: -1,
      ..Default::default()
    };
    let output_shape = params.output_shape(&input_shape, &filter_shape).unwrap();
    prop_assert_eq!(output_shape, TensorShape::new(2, 6, 4, 6));
    let layer = Layer {
      params,
      quant: PerChannelQuantization::new(vec![1_500_000_000; 6], vec![-6; 6]),
      input_shape,
      input,
      filter_shape,
      filter,
      bias: Some(vec![100, -100, 0, 7, 8, 9]),
      output_shape,
    };

    let cfu = Cfu::new(CfuModel::new());
    let mut gemm = TiledGemm::with_tile(&cfu, 2).unwrap();
    let expected = layer.run(&mut gemm);
    // M = 24 rows, N = 3 filters per group, 2 groups, 2 batches
    prop_assert_eq!(gemm.total_stats().starts, 12 * 2 * 2 * 2);

    // A unit large enough to take every GEMM in one burst.
    let wide = Cfu::new(CfuModel::with_tile(32));
    let mut gemm = TiledGemm::new(&wide);
    prop_assert_eq!(&layer.run(&mut gemm), &expected);
    prop_assert_eq!(gemm.total_stats().starts, 4);
  }

  #[test]
  fn test_narrow_activation_range_clamps_full_output(layer in layer_strategy(), (lo, hi) in activation_range()) {
    let mut full = layer.clone();
    full.params.activation_min = i8::MIN as i32;
    full.params.activation_max = i8::MAX as i32;
    let mut narrow = layer;
    narrow.params.activation_min = lo;
    narrow.params.activation_max = hi;

    let cfu = Cfu::new(CfuModel::new());
    let full_out = full.run(&mut TiledGemm::new(&cfu));
    let narrow_out = narrow.run(&mut TiledGemm::new(&cfu));
    for (f, n) in full_out.iter().zip(&narrow_out) {
      prop_assert!((lo..=hi).contains(&(*n as i32)));
      prop_assert_eq!(*n as i32, (*f as i32).clamp(lo, hi));
    }
  }

  /// With zero offsets and a rescale of 1 or 1/2, both rounding laws coincide.
  #[test]
  fn test_wide_reference_agrees_on_int8_data(layer in layer_strategy(), shifts in prop::collection::vec(0i32..=1, 9)) {
    let depth = layer.filter_shape.batch;
    let mut layer = layer;
    layer.params.input_offset = 0;
    layer.params.output_offset = 0;
    layer.quant = PerChannelQuantization::new(vec![1 << 30; depth], shifts[..depth].to_vec());
    let expected = layer.reference();

    let input: Vec<i16> = layer.input.iter().map(|&v| v as i16).collect();
    let bias: Option<Vec<i64>> = layer.bias.as_ref().map(|b| b.iter().map(|&v| v as i64).collect());
    let mut output = vec![0i16; layer.output_shape.flat_size()];
    conv_per_channel_i16(
      &layer.params,
      &layer.quant,
      &layer.input_shape,
      &input,
      &layer.filter_shape,
      &layer.filter,
      bias.as_deref(),
      &layer.output_shape,
      &mut output,
    )
    .unwrap();
    let narrowed: Vec<i8> = output.iter().map(|&v| v as i8).collect();
    prop_assert_eq!(narrowed, expected);
  }
}

#[test]
fn test_padding_contributes_zero_not_offset() {
  let shape = TensorShape::new(1, 3, 3, 1);
  let params = ConvParams {
    pad_height: 1,
    pad_width: 1,
    input_offset: 5,
    ..Default::default()
  };
  let cfu = Cfu::new(CfuModel::new());
  let mut output = [0i8; 9];
  conv_per_channel(
    &params,
    &PerChannelQuantization::identity(1),
    &shape,
    &[0; 9],
    &shape,
    &[1; 9],
    None,
    &shape,
    &mut output,
    &mut TiledGemm::new(&cfu),
    &mut ConvScratch::new(),
  )
  .unwrap();
  // Each in-bounds tap adds 5; corners see 4 taps, edges 6, the centre 9.
  assert_eq!(output, [20, 30, 20, 30, 45, 30, 20, 30, 20]);
}

#[test]
fn test_groups_never_read_other_groups() {
  let input_shape = TensorShape::new(1, 2, 2, 2);
  let filter_shape = TensorShape::new(2, 1, 1, 1);
  let output_shape = TensorShape::new(1, 2, 2, 2);
  let quant = PerChannelQuantization::identity(2);
  let params = ConvParams::default();
  let cfu = Cfu::new(CfuModel::new());

  let run = |input: &[i8]| {
    let mut output = [0i8; 8];
    conv_per_channel(
      &params,
      &quant,
      &input_shape,
      input,
      &filter_shape,
      &[2, 3],
      None,
      &output_shape,
      &mut output,
      &mut TiledGemm::new(&cfu),
      &mut ConvScratch::new(),
    )
    .unwrap();
    output
  };

  let base = run(&[1, 10, 2, 20, 3, 30, 4, 40]);
  assert_eq!(base, [2, 30, 4, 60, 6, 90, 8, 120]);

  // Changing group 1's channel leaves group 0's outputs alone.
  let changed = run(&[1, -7, 2, -7, 3, -7, 4, -7]);
  for pixel in 0..4 {
    assert_eq!(changed[pixel * 2], base[pixel * 2]);
    assert_eq!(changed[pixel * 2 + 1], -21);
  }
}

#[test]
fn test_output_saturates_within_activation_range() {
  let shape = TensorShape::new(1, 1, 2, 1);
  let filter_shape = TensorShape::new(2, 1, 1, 1);
  let out_shape = TensorShape::new(1, 1, 2, 2);
  let params = ConvParams {
    activation_min: -20,
    activation_max: 20,
    ..Default::default()
  };
  let cfu = Cfu::new(CfuModel::new());
  let mut output = [0i8; 4];
  conv_per_channel(
    &params,
    &PerChannelQuantization::identity(2),
    &shape,
    &[20, -127],
    &filter_shape,
    &[1, 127],
    None,
    &out_shape,
    &mut output,
    &mut TiledGemm::new(&cfu),
    &mut ConvScratch::new(),
  )
  .unwrap();
  // 20 sits on the boundary and is kept as is; the rest clamp.
  assert_eq!(output, [20, 20, -20, -20]);
}


#[test]
fn test_scenario_window_sum() {
  let shape = TensorShape::new(1, 3, 3, 1);
  let cfu = Cfu::new(CfuModel::new());
  let mut output = [0i8; 1];
  conv_per_channel(
    &ConvParams::default(),
    &PerChannelQuantization::identity(1),
    &shape,
    &[0; 9],
    &shape,
    &[1; 9],
    Some(&[0]),
    &TensorShape::new(1, 1, 1, 1),
    &mut output,
    &mut TiledGemm::new(&cfu),
    &mut ConvScratch::new(),
  )
  .unwrap();
  // All inputs at the zero point contribute nothing.
  assert_eq!(output, [0]);

  let params = ConvParams {
    input_offset: 1,
    ..Default::default()
  };
  conv_per_channel(
    &params,
    &PerChannelQuantization::identity(1),
    &shape,
    &[0; 9],
    &shape,
    &[1; 9],
    Some(&[0]),
    &TensorShape::new(1, 1, 1, 1),
    &mut output,
    &mut TiledGemm::new(&cfu),
    &mut ConvScratch::new(),
  )
  .unwrap();
  assert_eq!(output, [9]);
}

#[test]
fn test_scenario_pointwise_scale() {
  let shape = TensorShape::new(1, 2, 2, 1);
  let cfu = Cfu::new(CfuModel::new());
  let mut output = [0i8; 4];
  conv_per_channel(
    &ConvParams::default(),
    &PerChannelQuantization::identity(1),
    &shape,
    &[1, -2, 3, -4],
    &TensorShape::new(1, 1, 1, 1),
    &[3],
    Some(&[1]),
    &shape,
    &mut output,
    &mut TiledGemm::new(&cfu),
    &mut ConvScratch::new(),
  )
  .unwrap();
  assert_eq!(output, [4, -5, 10, -11]);
}

#[test]
fn test_scenario_clamps_exactly_at_max() {
  let shape = TensorShape::new(1, 1, 1, 2);
  let filter_shape = TensorShape::new(1, 1, 1, 2);
  let params = ConvParams {
    input_offset: 128,
    output_offset: 10,
    ..Default::default()
  };
  // Scale by 2: (-100 + 128) * 127 + (-128 + 128) * 5 = 3556 -> 7112 + 10
  let quant = PerChannelQuantization::new(vec![1 << 30], vec![2]);
  let cfu = Cfu::new(CfuModel::new());
  let mut output = [0i8; 1];
  conv_per_channel(
    &params,
    &quant,
    &shape,
    &[-100, -128],
    &filter_shape,
    &[127, 5],
    None,
    &TensorShape::new(1, 1, 1, 1),
    &mut output,
    &mut TiledGemm::new(&cfu),
    &mut ConvScratch::new(),
  )
  .unwrap();
  assert_eq!(output, [127]);
}
