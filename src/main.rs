use handmark::annotator::{AnnotatorOptions, HandAnnotator};
use handmark::detector::{onnx::OnnxHandDetector, ModelComplexity};
use handmark::gui;
use handmark::image::Resolution;
use handmark::pipeline::{self, LoopOptions};
use handmark::video::webcam::{Webcam, WebcamOptions};

fn main() {
    handmark::init_logger!();

    gui::run(app);
}

fn app() -> anyhow::Result<()> {
    let complexity = ModelComplexity::Full;
    let detector = OnnxHandDetector::new(complexity)?;
    let mut annotator = HandAnnotator::new(
        detector,
        AnnotatorOptions::new().model_complexity(complexity),
    )?;

    let webcam = Webcam::open(
        WebcamOptions::default()
            .resolution(Resolution::RES_VGA)
            .fps(30),
    )?;

    let stats = pipeline::run(
        webcam,
        &mut annotator,
        gui::Window::new("handmark"),
        &LoopOptions::default(),
    )?;
    log::info!(
        "shown {} frames ({} skipped due to decode errors)",
        stats.frames,
        stats.skipped
    );
    Ok(())
}
