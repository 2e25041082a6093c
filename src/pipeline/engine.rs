use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{
    config::Config,
    depth::{DepthField, TemporalSmoother},
    error::{DepthVideoError, PipelineError, Result},
    generator::{GeneratedFrame, GenerationConfig, Generator, Kind},
    pipeline::sequence::{SequenceAllocator, FILE_PREFIX},
    video::{Batch, Frame, FrameBatches, FrameSink, FrameSource, SegmentStitcher},
};

const MESH_REJECTION: &str =
    "Creating mesh-videos is not supported. Please split video into frames and use batch processing.";

/// Outcome of one pipeline run
#[derive(Debug, Clone)]
pub enum RunReport {
    /// The request was refused before any work started
    Rejected { message: String },

    /// All batches were processed and stitched, one output per kind
    Completed { outputs: Vec<StitchedOutput> },
}

/// Final video of one output kind
#[derive(Debug, Clone)]
pub struct StitchedOutput {
    pub kind: Kind,
    pub path: PathBuf,
    /// Number of per-batch segments joined into this file
    pub segments: usize,
}

impl RunReport {
    /// Short user-facing summary
    pub fn message(&self) -> String {
        match self {
            RunReport::Rejected { message } => message.clone(),
            RunReport::Completed { outputs } => match outputs.len() {
                0 => "Nothing generated - please check the settings and try again".to_string(),
                1 => "Video generated".to_string(),
                _ => "Videos generated".to_string(),
            },
        }
    }

    pub fn outputs(&self) -> &[StitchedOutput] {
        match self {
            RunReport::Rejected { .. } => &[],
            RunReport::Completed { outputs } => outputs,
        }
    }
}

/// Drives one input video through decode, depth, generation, encode and stitch.
///
/// The pipeline is:
/// 1. Prepare - reject unsupported requests, check the custom depth video length
/// 2. Per batch - acquire depth (first pass + smoothing, or the custom depth video),
///    generate every requested kind, write one segment per kind
/// 3. Stitch - join each kind's segments into one file
/// 4. Cleanup - delete the per-batch segments
///
/// Batches are processed strictly in order; only the per-frame work inside a
/// batch runs on the thread pool.
pub struct VideoPipeline {
    config: Config,
    generator: Box<dyn Generator>,
    source: FrameSource,
    sink: FrameSink,
    stitcher: SegmentStitcher,
    smoother: TemporalSmoother,
    pool: rayon::ThreadPool,
    sequences: SequenceAllocator,
}

impl VideoPipeline {
    pub fn new(config: Config, generator: Box<dyn Generator>) -> Result<Self> {
        config.validate()?;

        let tools = config.encoding.tools();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.video.processing_threads)
            .build()
            .map_err(|e| DepthVideoError::generic(format!("Failed to build thread pool: {}", e)))?;

        Ok(Self {
            source: FrameSource::new(tools.clone()),
            sink: FrameSink::new(tools.clone())
                .with_codecs(config.encoding.color_codec.clone(), config.encoding.depth_codec.clone()),
            stitcher: SegmentStitcher::new(tools),
            smoother: TemporalSmoother::new(config.smoothing.mode.clone()),
            sequences: SequenceAllocator::new(config.output.directory.clone()),
            pool,
            generator,
            config,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output.directory
    }

    /// Process `input`, optionally using `custom_depth` instead of computing depth
    pub fn run<P: AsRef<Path>>(&mut self, input: P, custom_depth: Option<&Path>) -> Result<RunReport> {
        let input = input.as_ref();
        let generation = self.config.generation.generation_config();

        info!("🎬 Starting depth video generation");
        info!("   Input: {:?}", input);
        if let Some(depth) = custom_depth {
            info!("   Custom depth: {:?}", depth);
        }
        info!("   Output: {:?}", self.output_dir());
        info!("   Generator: {}", self.generator.name());

        // PREPARE
        match self.prepare(&generation, input, custom_depth) {
            Ok(()) => {}
            Err(DepthVideoError::Pipeline(PipelineError::UnsupportedRequest { reason })) => {
                warn!("Request rejected: {}", reason);
                return Ok(RunReport::Rejected { message: reason });
            }
            Err(e) => return Err(e),
        }

        // PER BATCH
        let segments = self.process_batches(input, custom_depth, &generation)?;

        // STITCH
        let outputs = self.stitch(&segments)?;

        // CLEANUP
        if self.config.output.keep_intermediates {
            info!("Keeping intermediate segments");
        } else {
            let names: Vec<String> = segments.values().flatten().cloned().collect();
            remove_intermediates(self.output_dir(), &names);
        }

        let report = RunReport::Completed { outputs };
        info!("🎉 All done: {}", report.message());
        Ok(report)
    }

    fn prepare(&self, generation: &GenerationConfig, input: &Path, custom_depth: Option<&Path>) -> Result<()> {
        if generation.requests_mesh() {
            return Err(PipelineError::UnsupportedRequest {
                reason: MESH_REJECTION.to_string(),
            }
            .into());
        }
        self.generator.validate_config(generation)?;

        std::fs::create_dir_all(self.output_dir())?;

        if let Some(depth_path) = custom_depth {
            let input_count = self.source.count_frames(input, &self.config.video.source_options(false))?;
            let depth_count = self
                .source
                .count_frames(depth_path, &self.config.video.source_options(true))?;
            debug!("Frame counts: input {}, depth {}", input_count, depth_count);
            if input_count != depth_count {
                return Err(PipelineError::DepthVideoMismatch {
                    input: input_count,
                    depth: depth_count,
                }
                .into());
            }
        }
        Ok(())
    }

    fn process_batches(
        &mut self,
        input: &Path,
        custom_depth: Option<&Path>,
        generation: &GenerationConfig,
    ) -> Result<BTreeMap<Kind, Vec<String>>> {
        let input_batches = self
            .source
            .open_batches(input, &self.config.video.source_options(false))?;
        let mut depth_batches = match custom_depth {
            Some(path) => Some(
                self.source
                    .open_batches(path, &self.config.video.source_options(true))?,
            ),
            None => None,
        };

        let output_dir = self.config.output.directory.clone();
        let bitrate = self.config.encoding.colorvids_bitrate;
        let mut segments: BTreeMap<Kind, Vec<String>> = BTreeMap::new();

        for batch in input_batches {
            let batch = batch?;
            let seq_no = batch.index + 1;
            info!(
                "📦 Batch {}: {} frames from frame {} at {:.3} fps",
                seq_no,
                batch.len(),
                batch.first_frame,
                batch.fps
            );

            let depths = match depth_batches.as_mut() {
                None => self.compute_depth(&batch, generation)?,
                Some(batches) => next_custom_depth(batches, &batch)?,
            };

            debug!("Generating output frames");
            let results = self
                .pool
                .install(|| self.generator.generate(&batch.frames, Some(depths.as_slice()), generation))?;
            drop(depths);
            let by_kind = partition_by_kind(batch.index, batch.len(), &generation.outputs, results)?;

            for (kind, frames) in by_kind {
                if kind.is_depth() && custom_depth.is_some() {
                    debug!("Skipping depth output, depth was supplied");
                    continue;
                }

                let base = format!("{}_video", kind);
                let sequence = self.sequences.next(&base)?;
                let name = format!("{}{}-{}-{:04}", FILE_PREFIX, sequence, base, seq_no);
                let artifact = self.sink.write(batch.fps, &frames, &output_dir, &name, bitrate)?;
                segments.entry(kind).or_default().push(artifact.file_name);
            }
        }

        Ok(segments)
    }

    /// First pass: raw depth prediction for the batch, then temporal smoothing
    fn compute_depth(&self, batch: &Batch, generation: &GenerationConfig) -> Result<Vec<Frame>> {
        debug!("Generating depthmaps for the video frames");
        let first_pass = generation.first_pass_with(self.generator.first_pass_keys());
        let raw = self
            .pool
            .install(|| self.generator.generate(&batch.frames, None, &first_pass))?;
        let fields = depth_fields(batch.index, batch.len(), raw)?;

        debug!("Smoothing {} depth fields ({})", fields.len(), self.smoother.mode());
        let smoothed = self.pool.install(|| self.smoother.smooth(&fields))?;
        Ok(smoothed.into_iter().map(Frame::Field).collect())
    }

    fn stitch(&mut self, segments: &BTreeMap<Kind, Vec<String>>) -> Result<Vec<StitchedOutput>> {
        let output_dir = self.config.output.directory.clone();
        let mut outputs = Vec::with_capacity(segments.len());

        for (kind, names) in segments {
            let extension = names
                .first()
                .and_then(|name| Path::new(name).extension())
                .and_then(|ext| ext.to_str())
                .unwrap_or("mp4");
            let base = format!("{}_video", kind);
            let sequence = self.sequences.next(&base)?;
            let output_name = format!("{}{}-{}.{}", FILE_PREFIX, sequence, base, extension);

            info!("🔗 Stitching {} {} segments into {}", names.len(), kind, output_name);
            let path = self.stitcher.concat(&output_dir, names, &output_name)?;
            outputs.push(StitchedOutput {
                kind: kind.clone(),
                path,
                segments: names.len(),
            });
        }

        Ok(outputs)
    }
}

/// Next batch of the custom depth video, checked against the input batch
fn next_custom_depth(depth_batches: &mut FrameBatches, batch: &Batch) -> Result<Vec<Frame>> {
    let depth_batch = depth_batches.next().transpose()?;
    let depth_len = depth_batch.as_ref().map_or(0, Batch::len);
    if depth_len != batch.len() {
        return Err(PipelineError::DepthVideoMismatch {
            input: batch.len(),
            depth: depth_len,
        }
        .into());
    }

    let frames = depth_batch.map(|b| b.frames).unwrap_or_default();
    if let (Some(depth), Some(input)) = (frames.first(), batch.frames.first()) {
        if depth.dimensions() != input.dimensions() {
            warn!(
                "Input video size {:?} and depthmap video size {:?} are not the same!",
                input.dimensions(),
                depth.dimensions()
            );
        }
    }
    Ok(frames)
}

/// Raw depth fields of a first pass, one per input frame in frame order
fn depth_fields(batch: usize, frame_count: usize, raw: Vec<GeneratedFrame>) -> Result<Vec<DepthField>> {
    let mut slots: Vec<Option<DepthField>> = vec![None; frame_count];

    for generated in raw {
        if !generated.kind.is_depth() {
            return Err(PipelineError::GeneratorOutput {
                reason: format!("batch {}: depth pass produced '{}'", batch, generated.kind),
            }
            .into());
        }
        let slot = slots.get_mut(generated.index).ok_or_else(|| PipelineError::GeneratorOutput {
            reason: format!("batch {}: depth for frame {} of {}", batch, generated.index, frame_count),
        })?;
        if slot.is_some() {
            return Err(PipelineError::GeneratorOutput {
                reason: format!("batch {}: duplicate depth for frame {}", batch, generated.index),
            }
            .into());
        }
        *slot = Some(generated.frame.to_field());
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| -> Result<DepthField> {
            slot.ok_or_else(|| {
                PipelineError::GeneratorOutput {
                    reason: format!("batch {}: no depth for frame {}", batch, index),
                }
                .into()
            })
        })
        .collect()
}

/// Split generator output into per-kind frame sequences in frame order.
///
/// The produced kinds must be exactly the requested ones, each with one
/// frame per input frame.
fn partition_by_kind(
    batch: usize,
    frame_count: usize,
    requested: &[Kind],
    results: Vec<GeneratedFrame>,
) -> Result<BTreeMap<Kind, Vec<Frame>>> {
    let mut grouped: BTreeMap<Kind, Vec<(usize, Frame)>> = BTreeMap::new();
    for generated in results {
        grouped
            .entry(generated.kind)
            .or_default()
            .push((generated.index, generated.frame));
    }

    let expected: BTreeSet<&Kind> = requested.iter().collect();
    let actual: BTreeSet<&Kind> = grouped.keys().collect();
    if expected != actual {
        return Err(PipelineError::InconsistentKinds {
            batch,
            expected: expected.iter().map(|k| k.to_string()).collect(),
            actual: actual.iter().map(|k| k.to_string()).collect(),
        }
        .into());
    }

    grouped
        .into_iter()
        .map(|(kind, mut frames)| -> Result<(Kind, Vec<Frame>)> {
            frames.sort_by_key(|(index, _)| *index);
            let in_order = frames.len() == frame_count
                && frames.iter().enumerate().all(|(i, (index, _))| i == *index);
            if !in_order {
                return Err(PipelineError::GeneratorOutput {
                    reason: format!(
                        "batch {}: kind '{}' has {} frames for {} input frames",
                        batch,
                        kind,
                        frames.len(),
                        frame_count
                    ),
                }
                .into());
            }
            Ok((kind, frames.into_iter().map(|(_, frame)| frame).collect()))
        })
        .collect()
}

/// Delete per-batch segments, logging and skipping failures.
///
/// Returns how many files were removed.
pub fn remove_intermediates(dir: &Path, file_names: &[String]) -> usize {
    let mut removed = 0;
    for name in file_names {
        let path = dir.join(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("{} can't be deleted: {}", path.display(), e),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeneratorError;
    use crate::generator::LuminanceGenerator;
    use crate::video::FfmpegTools;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, RgbaImage};
    use std::fs::File;
    use tempfile::tempdir;

    fn generated(index: usize, kind: &str) -> GeneratedFrame {
        GeneratedFrame {
            index,
            kind: Kind::from(kind),
            frame: Frame::Field(DepthField::filled(2, 2, index as f32)),
        }
    }

    fn write_gif(path: &Path, frames: usize) {
        let file = File::create(path).unwrap();
        let mut encoder = GifEncoder::new(file);
        let frames: Vec<image::Frame> = (0..frames)
            .map(|i| {
                let v = (i * 40 % 256) as u8;
                image::Frame::from_parts(
                    RgbaImage::from_pixel(8, 6, image::Rgba([v, v, v, 255])),
                    0,
                    0,
                    Delay::from_numer_denom_ms(40, 1),
                )
            })
            .collect();
        encoder.encode_frames(frames).unwrap();
    }

    fn test_config(output: &Path, outputs: &[&str], batch_size: usize) -> Config {
        let mut config = Config::default();
        config.output.directory = output.to_path_buf();
        config.video.batch_size = batch_size;
        config.video.processing_threads = 2;
        config.generation.outputs = outputs.iter().map(|k| Kind::from(*k)).collect();
        config
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Produces `depth` in the first pass and a configurable kind set after it
    struct ScriptedGenerator {
        kinds: Vec<&'static str>,
    }

    impl Generator for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        fn description(&self) -> &str {
            "test generator"
        }

        fn supported_kinds(&self) -> Vec<Kind> {
            vec![Kind::depth(), Kind::from("heatmap")]
        }

        fn generate(
            &self,
            frames: &[Frame],
            _depths: Option<&[Frame]>,
            config: &GenerationConfig,
        ) -> Result<Vec<GeneratedFrame>> {
            if config.depth_prediction {
                return Ok((0..frames.len()).map(|i| generated(i, "depth")).collect());
            }
            Ok((0..frames.len())
                .flat_map(|i| self.kinds.iter().map(move |k| generated(i, k)))
                .collect())
        }
    }

    #[test]
    fn test_report_messages() {
        let none = RunReport::Completed { outputs: vec![] };
        assert_eq!(none.message(), "Nothing generated - please check the settings and try again");

        let output = |kind: &str| StitchedOutput {
            kind: Kind::from(kind),
            path: PathBuf::from(format!("{}.mp4", kind)),
            segments: 2,
        };
        let one = RunReport::Completed { outputs: vec![output("depth")] };
        assert_eq!(one.message(), "Video generated");
        let many = RunReport::Completed {
            outputs: vec![output("depth"), output("heatmap")],
        };
        assert_eq!(many.message(), "Videos generated");
        assert_eq!(many.outputs().len(), 2);
    }

    #[test]
    fn test_mesh_request_rejected_before_any_work() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out");
        let mut config = test_config(&output, &["depth"], 10);
        config.generation.gen_inpainted_mesh = true;

        let mut pipeline = VideoPipeline::new(config, Box::new(LuminanceGenerator::new())).unwrap();
        let report = pipeline.run(dir.path().join("missing.mp4"), None).unwrap();

        assert!(matches!(report, RunReport::Rejected { .. }));
        assert!(report.message().contains("mesh-videos is not supported"));
        assert!(!output.exists());
    }

    #[test]
    fn test_unsupported_output_fails_in_prepare() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), &["normals"], 10);
        let mut pipeline = VideoPipeline::new(config, Box::new(LuminanceGenerator::new())).unwrap();
        let result = pipeline.run(dir.path().join("missing.mp4"), None);
        assert!(matches!(
            result,
            Err(DepthVideoError::Generator(GeneratorError::InvalidConfig { .. }))
        ));
    }

    #[test]
    fn test_depth_video_length_mismatch_writes_nothing() {
        let inputs = tempdir().unwrap();
        let output = tempdir().unwrap();
        let input = inputs.path().join("input.gif");
        let depth = inputs.path().join("depth.gif");
        write_gif(&input, 4);
        write_gif(&depth, 3);

        let config = test_config(output.path(), &["heatmap"], 2);
        let mut pipeline = VideoPipeline::new(config, Box::new(LuminanceGenerator::new())).unwrap();
        let result = pipeline.run(&input, Some(depth.as_path()));

        match result {
            Err(DepthVideoError::Pipeline(PipelineError::DepthVideoMismatch { input, depth })) => {
                assert_eq!((input, depth), (4, 3));
            }
            other => panic!("expected length mismatch, got {:?}", other),
        }
        assert!(file_names(output.path()).is_empty());
    }

    #[test]
    fn test_inconsistent_generator_kinds_abort_before_writing() {
        let inputs = tempdir().unwrap();
        let output = tempdir().unwrap();
        let input = inputs.path().join("input.gif");
        write_gif(&input, 3);

        let config = test_config(output.path(), &["depth", "heatmap"], 2);
        let generator = ScriptedGenerator { kinds: vec!["depth"] };
        let mut pipeline = VideoPipeline::new(config, Box::new(generator)).unwrap();
        let result = pipeline.run(&input, None);

        assert!(matches!(
            result,
            Err(DepthVideoError::Pipeline(PipelineError::InconsistentKinds { batch: 0, .. }))
        ));
        assert!(file_names(output.path()).is_empty());
    }

    #[test]
    fn test_partition_orders_frames_per_kind() {
        let requested = vec![Kind::depth(), Kind::from("heatmap")];
        let results = vec![
            generated(1, "heatmap"),
            generated(0, "depth"),
            generated(0, "heatmap"),
            generated(1, "depth"),
        ];

        let by_kind = partition_by_kind(0, 2, &requested, results).unwrap();
        assert_eq!(by_kind.len(), 2);
        for frames in by_kind.values() {
            let firsts: Vec<f32> = frames.iter().map(|f| f.as_field().unwrap().as_slice()[0]).collect();
            assert_eq!(firsts, vec![0.0, 1.0]);
        }
    }

    #[test]
    fn test_partition_rejects_missing_frames() {
        let requested = vec![Kind::depth()];
        let result = partition_by_kind(3, 2, &requested, vec![generated(0, "depth")]);
        assert!(matches!(
            result,
            Err(DepthVideoError::Pipeline(PipelineError::GeneratorOutput { .. }))
        ));

        let result = partition_by_kind(3, 1, &requested, vec![generated(0, "depth"), generated(0, "heatmap")]);
        assert!(matches!(
            result,
            Err(DepthVideoError::Pipeline(PipelineError::InconsistentKinds { batch: 3, .. }))
        ));
    }

    #[test]
    fn test_depth_fields_requires_one_per_frame() {
        let fields = depth_fields(0, 2, vec![generated(1, "depth"), generated(0, "depth")]).unwrap();
        assert_eq!(fields[0].as_slice()[0], 0.0);
        assert_eq!(fields[1].as_slice()[0], 1.0);

        assert!(depth_fields(0, 2, vec![generated(0, "depth")]).is_err());
        assert!(depth_fields(0, 1, vec![generated(0, "depth"), generated(0, "depth")]).is_err());
        assert!(depth_fields(0, 1, vec![generated(0, "heatmap")]).is_err());
    }

    #[test]
    fn test_cleanup_continues_past_missing_files() {
        let dir = tempdir().unwrap();
        let names: Vec<String> = ["a.mp4", "gone.mp4", "b.mp4"].iter().map(|s| s.to_string()).collect();
        std::fs::write(dir.path().join("a.mp4"), b"a").unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"b").unwrap();

        assert_eq!(remove_intermediates(dir.path(), &names), 2);
        assert!(file_names(dir.path()).is_empty());
    }

    #[test]
    fn test_two_kinds_two_batches_end_to_end() {
        if !FfmpegTools::default().check_available() {
            eprintln!("ffmpeg not available, skipping");
            return;
        }
        let inputs = tempdir().unwrap();
        let output = tempdir().unwrap();
        let input = inputs.path().join("input.gif");
        write_gif(&input, 5);

        let mut config = test_config(output.path(), &["depth", "heatmap"], 3);
        config.smoothing.mode = crate::depth::SmoothingMode::Experimental;
        let mut pipeline = VideoPipeline::new(config, Box::new(LuminanceGenerator::new())).unwrap();
        let report = pipeline.run(&input, None).unwrap();

        assert_eq!(report.message(), "Videos generated");
        let outputs = report.outputs();
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().all(|o| o.segments == 2));

        let names = file_names(output.path());
        assert_eq!(names.len(), 2, "only final videos remain: {:?}", names);
        assert!(names.iter().any(|n| n.ends_with("-depth_video.avi")));
        assert!(names.iter().any(|n| n.ends_with("-heatmap_video.mp4")));

        let source = FrameSource::new(FfmpegTools::default());
        for output in outputs {
            let count = source
                .count_frames(&output.path, &crate::video::SourceOptions::default())
                .unwrap();
            assert_eq!(count, 5, "{}", output.path.display());
        }
    }

    #[test]
    fn test_custom_depth_skips_depth_output() {
        if !FfmpegTools::default().check_available() {
            eprintln!("ffmpeg not available, skipping");
            return;
        }
        let inputs = tempdir().unwrap();
        let output = tempdir().unwrap();
        let input = inputs.path().join("input.gif");
        let depth = inputs.path().join("depth.gif");
        write_gif(&input, 4);
        write_gif(&depth, 4);

        let config = test_config(output.path(), &["depth", "heatmap"], 3);
        let mut pipeline = VideoPipeline::new(config, Box::new(LuminanceGenerator::new())).unwrap();
        let report = pipeline.run(&input, Some(depth.as_path())).unwrap();

        assert_eq!(report.message(), "Video generated");
        assert_eq!(report.outputs()[0].kind, Kind::from("heatmap"));
        let names = file_names(output.path());
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with("-heatmap_video.mp4"));
    }

    /// ffmpeg stand-in: encodes copy stdin to the output, concat runs `concat_body`
    #[cfg(unix)]
    fn scripted_ffmpeg(dir: &Path, concat_body: &str) -> PathBuf {
        crate::video::ffmpeg::fake::script(
            dir,
            "ffmpeg",
            &format!(
                "for last; do :; done\ncase \"$*\" in\n  *\"-f concat\"*) {} ;;\n  *) cat > \"$last\" ;;\nesac",
                concat_body
            ),
        )
    }

    #[cfg(unix)]
    #[test]
    fn test_stitch_failure_keeps_all_segments() {
        let inputs = tempdir().unwrap();
        let output = tempdir().unwrap();
        let input = inputs.path().join("input.gif");
        write_gif(&input, 5);

        let mut config = test_config(output.path(), &["depth", "heatmap"], 3);
        config.encoding.ffmpeg = scripted_ffmpeg(inputs.path(), "echo 'concat demuxer failed' >&2; exit 1");
        let mut pipeline = VideoPipeline::new(config, Box::new(LuminanceGenerator::new())).unwrap();
        let result = pipeline.run(&input, None);

        match result {
            Err(DepthVideoError::Stitch(crate::error::StitchError::Failed { reason })) => {
                assert!(reason.contains("concat demuxer failed"), "{}", reason);
            }
            other => panic!("expected stitch failure, got {:?}", other),
        }

        let names = file_names(output.path());
        assert_eq!(names.len(), 4, "{:?}", names);
        for (kind, ext) in [("depth", "avi"), ("heatmap", "mp4")] {
            for batch in ["0001", "0002"] {
                let suffix = format!("-{}_video-{}.{}", kind, batch, ext);
                assert!(names.iter().any(|n| n.ends_with(&suffix)), "{} missing in {:?}", suffix, names);
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_two_kinds_two_batches_leave_only_finals() {
        let inputs = tempdir().unwrap();
        let output = tempdir().unwrap();
        let input = inputs.path().join("input.gif");
        write_gif(&input, 5);

        let mut config = test_config(output.path(), &["depth", "heatmap"], 3);
        config.encoding.ffmpeg = scripted_ffmpeg(inputs.path(), "echo stitched > \"$last\"");
        let mut pipeline = VideoPipeline::new(config, Box::new(LuminanceGenerator::new())).unwrap();
        let report = pipeline.run(&input, None).unwrap();

        assert_eq!(report.message(), "Videos generated");
        assert!(report.outputs().iter().all(|o| o.segments == 2 && o.path.exists()));

        let names = file_names(output.path());
        assert_eq!(names.len(), 2, "{:?}", names);
        assert!(names.iter().any(|n| n.ends_with("-depth_video.avi")));
        assert!(names.iter().any(|n| n.ends_with("-heatmap_video.mp4")));
    }

    #[cfg(unix)]
    #[test]
    fn test_keep_intermediates_skips_cleanup() {
        let inputs = tempdir().unwrap();
        let output = tempdir().unwrap();
        let input = inputs.path().join("input.gif");
        write_gif(&input, 5);

        let mut config = test_config(output.path(), &["heatmap"], 3);
        config.output.keep_intermediates = true;
        config.encoding.ffmpeg = scripted_ffmpeg(inputs.path(), "echo stitched > \"$last\"");
        let mut pipeline = VideoPipeline::new(config, Box::new(LuminanceGenerator::new())).unwrap();
        let report = pipeline.run(&input, None).unwrap();

        assert_eq!(report.message(), "Video generated");
        assert_eq!(file_names(output.path()).len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_generator_parameters_reach_depth_pass() {
        let inputs = tempdir().unwrap();
        let input = inputs.path().join("input.gif");
        write_gif(&input, 5);

        let first_sample = |invert: bool| -> u16 {
            let output = tempdir().unwrap();
            let mut config = test_config(output.path(), &["depth"], 3);
            config.output.keep_intermediates = true;
            config
                .generation
                .parameters
                .insert("invert".to_string(), invert.into());
            config.encoding.ffmpeg = scripted_ffmpeg(inputs.path(), "echo stitched > \"$last\"");
            let mut pipeline = VideoPipeline::new(config, Box::new(LuminanceGenerator::new())).unwrap();
            pipeline.run(&input, None).unwrap();

            // the scripted encoder stores the raw gray16le stream
            let segment = file_names(output.path())
                .into_iter()
                .find(|n| n.ends_with("-depth_video-0001.avi"))
                .unwrap();
            let bytes = std::fs::read(output.path().join(segment)).unwrap();
            u16::from_le_bytes([bytes[0], bytes[1]])
        };

        // the first frame is black: nearest only when inverted
        assert_eq!(first_sample(false), 0);
        assert_eq!(first_sample(true), u16::MAX);
    }
}
