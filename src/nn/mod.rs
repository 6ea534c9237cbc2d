//! Neural Network inference.

pub mod tensor;

use std::{
    ops::{Index, RangeInclusive},
    path::Path,
    sync::Arc,
};

use tract_onnx::prelude::{
    tvec, Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, TypedFact, TypedOp,
};

use crate::image::{AsImageView, Color, ImageView, Resolution};
use tensor::Tensor;

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A convolutional neural network (CNN) that operates on image data.
///
/// Like the underlying [`NeuralNetwork`], this is a cheaply [`Clone`]able handle to the underlying
/// data.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    input_res: Resolution,
    color_mapper: ColorMapper,
}

impl Cnn {
    /// Creates a CNN wrapper from a [`NeuralNetwork`].
    ///
    /// The network must have exactly one input of shape `[1, 3, H, W]`.
    pub fn new(nn: NeuralNetwork, color_mapper: ColorMapper) -> anyhow::Result<Self> {
        let input_res = match nn.input_shape() {
            [1, 3, h, w] => Resolution::new((*w).try_into()?, (*h).try_into()?),
            shape => anyhow::bail!("invalid model input shape for CNN: {:?}", shape),
        };

        Ok(Self {
            nn,
            input_res,
            color_mapper,
        })
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Runs the network on an input image, returning the estimated outputs.
    ///
    /// The input image will be sampled to create the network's input tensor. If the image's aspect
    /// ratio does not match the network's input aspect ratio, the image will be stretched.
    pub fn estimate<V: AsImageView>(&self, image: &V) -> anyhow::Result<Outputs> {
        let tensor = self.image_to_tensor(image.as_view());
        self.nn.estimate(tensor)
    }

    fn image_to_tensor(&self, view: ImageView<'_>) -> Tensor {
        let (h, w) = (
            self.input_res.height() as usize,
            self.input_res.width() as usize,
        );
        let (vw, vh) = (view.width() as f32, view.height() as f32);

        Tensor::from_array_shape_fn([1, 3, h, w], |[_, c, y, x]| {
            let u = (x as f32 + 0.5) / w as f32;
            let v = (y as f32 + 0.5) / h as f32;
            let color = view.get((u * vw) as u32, (v * vh) as u32);
            self.color_mapper.map(color)[c]
        })
    }
}

/// Maps 8-bit colors to the value range a network expects.
#[derive(Clone, Debug)]
pub struct ColorMapper {
    target_range: RangeInclusive<f32>,
}

impl ColorMapper {
    /// Creates a color mapper that uniformly maps sRGB values to `target_range`.
    ///
    /// # Panics
    ///
    /// Panics if `target_range` is empty.
    pub fn linear(target_range: RangeInclusive<f32>) -> Self {
        assert!(target_range.end() > target_range.start());
        Self { target_range }
    }

    fn map(&self, color: Color) -> [f32; 3] {
        let start = *self.target_range.start();
        let end = *self.target_range.end();

        let adjust_range = (end - start) / 255.0;
        [color.r(), color.g(), color.b()].map(|col| col as f32 * adjust_range + start)
    }
}

/// Neural network loader.
pub struct Loader {
    model_data: Vec<u8>,
}

impl Loader {
    /// Loads and optimizes the network.
    ///
    /// Returns an error if the network data is malformed or incomplete, or if the network uses
    /// unimplemented operations.
    pub fn load(self) -> anyhow::Result<NeuralNetwork> {
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*self.model_data)?
            .into_optimized()?;
        let outputs = graph.output_outlets()?.to_vec();

        let input_fact = graph.input_fact(0)?;
        let input_shape = match input_fact.shape.as_concrete() {
            Some(shape) => shape.to_vec(),
            None => anyhow::bail!("network input has a symbolic shape"),
        };

        let model = SimplePlan::new_for_outputs(graph, &outputs)?;
        Ok(NeuralNetwork(Arc::new(NeuralNetworkImpl {
            inner: model,
            input_shape,
        })))
    }
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<NeuralNetworkImpl>);

struct NeuralNetworkImpl {
    inner: Model,
    input_shape: Vec<usize>,
}

impl NeuralNetwork {
    /// Reads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Loader> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl(path: &Path) -> anyhow::Result<Loader> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => anyhow::bail!(
                "neural network file '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        let model_data = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("failed to read '{}': {e}", path.display()))?;
        Ok(Loader { model_data })
    }

    /// Returns the shape of the network's first input.
    pub fn input_shape(&self) -> &[usize] {
        &self.0.input_shape
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.0.inner.model().inputs.len()
    }

    /// Runs the network on a single input tensor, returning the estimated [`Outputs`].
    #[doc(alias = "infer")]
    pub fn estimate(&self, input: Tensor) -> anyhow::Result<Outputs> {
        if self.num_inputs() != 1 {
            anyhow::bail!(
                "network takes {} inputs, but only 1 was provided",
                self.num_inputs()
            );
        }

        let input = TValue::from_const(Arc::new(input.to_tract()?));
        let outputs = self.0.inner.run(tvec![input])?;
        let inner = outputs
            .iter()
            .map(|tract| Tensor::from_tract(tract))
            .collect::<anyhow::Result<_>>()?;
        Ok(Outputs { inner })
    }
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's (selected) output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: TVec<Tensor>,
}

impl Outputs {
    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns output tensor `index`, or an error if the network produced fewer outputs.
    pub fn get(&self, index: usize) -> anyhow::Result<&Tensor> {
        self.inner.get(index).ok_or_else(|| {
            anyhow::anyhow!(
                "network output #{index} missing ({} outputs)",
                self.inner.len()
            )
        })
    }
}

impl FromIterator<Tensor> for Outputs {
    fn from_iter<T: IntoIterator<Item = Tensor>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_mapper() {
        let mapper = ColorMapper::linear(-1.0..=1.0);
        assert_eq!(mapper.map(Color::BLACK), [-1.0, -1.0, -1.0]);
        assert_eq!(mapper.map(Color::WHITE), [1.0, 1.0, 1.0]);

        let mapper = ColorMapper::linear(0.0..=1.0);
        assert_eq!(mapper.map(Color::RED), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn rejects_non_onnx_paths() {
        let err = NeuralNetwork::from_path("model.tflite").err().unwrap();
        assert!(err.to_string().contains("`.onnx`"), "{err}");

        let err = NeuralNetwork::from_path("/nonexistent/model.onnx").err().unwrap();
        assert!(err.to_string().contains("/nonexistent/model.onnx"), "{err}");
    }

    #[test]
    fn missing_output() {
        let outputs = Outputs::from_iter([Tensor::from_iter(&[1], [0.0])]);
        assert_eq!(outputs.len(), 1);
        assert!(outputs.get(0).is_ok());
        assert!(outputs.get(1).is_err());
    }
}
