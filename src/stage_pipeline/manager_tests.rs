//==================================================================================
// End-to-End Pipeline Tests
//==================================================================================
use std::cell::RefCell;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use crate::bridge::format::RunReport;
use crate::error::{ErrorCategory, PipelineError};
use crate::kernels::SubstitutionTable;
use crate::stage_pipeline::mediator::{self, Mediator, OutputPort, SharedPort};
use crate::stage_pipeline::orchestrator::PipelineManager;
use crate::stage_pipeline::registry::StageRegistry;
use crate::stage_pipeline::traits::{
    Capabilities, Downstream, Stage, StageId, StageState, StageStats,
};
use crate::types::ExchangeType;

// Test Helpers

/// A scratch directory holding every artifact of one test.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn reader_config(&self, name: &str, buffer_size: usize) -> PathBuf {
        self.write(name, format!("buffer_size = {}\n", buffer_size))
    }

    fn writer_config(&self, name: &str, buffer_size: usize, accept: Option<&str>) -> PathBuf {
        let mut text = format!("buffer_size = {}\n", buffer_size);
        if let Some(accept) = accept {
            text.push_str(&format!("accept = {}\n", accept));
        }
        self.write(name, text)
    }

    fn substitutor_config(&self, name: &str, table_text: &str, accept: Option<&str>) -> PathBuf {
        let table = self.write(&format!("{}.table", name), table_text);
        let mut text = format!("table_file = {}\n", table.display());
        if let Some(accept) = accept {
            text.push_str(&format!("accept = {}\n", accept));
        }
        self.write(name, text)
    }

    fn run_config(&self, name: &str, input: &Path, output: &Path, stages: &[(&str, &PathBuf)]) -> PathBuf {
        let descriptor = stages
            .iter()
            .map(|(id, cfg)| format!("{}, {}", id, cfg.display()))
            .collect::<Vec<_>>()
            .join(" ; ");
        self.write(
            name,
            format!(
                "input_file = {}\noutput_file = {}\npipeline = {}\n",
                input.display(),
                output.display(),
                descriptor
            ),
        )
    }

    /// reader -> substitutor -> writer over `input`, returning (run config, output path).
    fn substitution_run(
        &self,
        tag: &str,
        input: &[u8],
        table_text: &str,
        reader_size: usize,
        writer_size: usize,
        accept: Option<&str>,
    ) -> (PathBuf, PathBuf) {
        let input_path = self.write(&format!("{}.in", tag), input);
        let output_path = self.path(&format!("{}.out", tag));
        let reader = self.reader_config(&format!("{}.reader.cfg", tag), reader_size);
        let substitutor = self.substitutor_config(&format!("{}.sub.cfg", tag), table_text, accept);
        let writer = self.writer_config(&format!("{}.writer.cfg", tag), writer_size, accept);
        let run = self.run_config(
            &format!("{}.run.cfg", tag),
            &input_path,
            &output_path,
            &[
                ("file_reader", &reader),
                ("substitutor", &substitutor),
                ("file_writer", &writer),
            ],
        );
        (run, output_path)
    }
}

fn run(config: &Path) -> Result<RunReport, PipelineError> {
    PipelineManager::from_config_file(config)?.run()
}

/// A permutation over a random subset of byte values.
fn random_table(rng: &mut StdRng) -> SubstitutionTable {
    let keys: Vec<u8> = (0..=u8::MAX).filter(|_| rng.random_bool(0.6)).collect();
    let mut values = keys.clone();
    values.shuffle(rng);
    SubstitutionTable::from_pairs(keys.into_iter().zip(values)).unwrap()
}

fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.random::<u8>()).collect()
}

/// Shared sink so a test can inspect individual write calls after the run.
#[derive(Clone, Default)]
struct Recorder {
    writes: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl Recorder {
    fn bytes(&self) -> Vec<u8> {
        self.writes.borrow().concat()
    }
}

impl Write for Recorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writes.borrow_mut().push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

//==================================================================================
// 1. Reference Scenarios
//==================================================================================

#[test]
fn test_empty_input_produces_empty_output() {
    let fx = Fixture::new();
    let (config, output) =
        fx.substitution_run("empty", &[], "0x01=>0x02\n0x02=>0x01\n", 8, 8, None);

    let report = run(&config).unwrap();

    assert_eq!(fs::read(&output).unwrap(), Vec::<u8>::new());
    assert_eq!(report.bytes_read, 0);
    assert_eq!(report.bytes_written, 0);
    assert!(report.stages.iter().all(|s| s.state == StageState::Finished));
}

#[test]
fn test_two_byte_swap() {
    let fx = Fixture::new();
    let (config, output) = fx.substitution_run(
        "swap",
        &[0x01, 0x03, 0x02],
        "0x01=>0x02\n0x02=>0x01\n",
        2,
        2,
        None,
    );

    run(&config).unwrap();

    assert_eq!(fs::read(&output).unwrap(), vec![0x02, 0x03, 0x01]);
}

#[test]
fn test_broken_table_fails_before_any_stream_is_opened() {
    let fx = Fixture::new();
    let (config, output) = fx.substitution_run("broken", &[0x01], "0x01=>0x02\n", 4, 4, None);

    let err = run(&config).unwrap_err();

    assert!(matches!(err, PipelineError::Semantic(_)));
    assert_eq!(err.category().label(), "semantic error");
    assert!(!output.exists(), "output must not be created");
}

#[test]
fn test_first_stage_without_reader_role_fails_construction() {
    let fx = Fixture::new();
    let input = fx.write("in.bin", [1u8, 2, 3]);
    let output = fx.path("out.bin");
    let sub = fx.substitutor_config("sub.cfg", "0x01=>0x01\n", None);
    let writer = fx.writer_config("writer.cfg", 4, None);
    let config = fx.run_config(
        "run.cfg",
        &input,
        &output,
        &[("substitutor", &sub), ("file_writer", &writer)],
    );

    let err = run(&config).unwrap_err();

    assert_eq!(err.category(), ErrorCategory::FailedPipelineConstruction);
    assert!(!output.exists());
}

//==================================================================================
// 2. Construction Failures
//==================================================================================

#[test]
fn test_last_stage_without_writer_role_fails_construction() {
    let fx = Fixture::new();
    let input = fx.write("in.bin", [1u8]);
    let reader = fx.reader_config("reader.cfg", 4);
    let sub = fx.substitutor_config("sub.cfg", "0x01=>0x01\n", None);
    let config = fx.run_config(
        "run.cfg",
        &input,
        &fx.path("out.bin"),
        &[("file_reader", &reader), ("substitutor", &sub)],
    );

    let err = run(&config).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::FailedPipelineConstruction);
}

#[test]
fn test_unknown_stage_identifier_fails_construction() {
    let fx = Fixture::new();
    let input = fx.write("in.bin", [1u8]);
    let reader = fx.reader_config("reader.cfg", 4);
    let other = fx.reader_config("other.cfg", 4);
    let writer = fx.writer_config("writer.cfg", 4, None);
    let config = fx.run_config(
        "run.cfg",
        &input,
        &fx.path("out.bin"),
        &[
            ("file_reader", &reader),
            ("rot13", &other),
            ("file_writer", &writer),
        ],
    );

    let err = run(&config).unwrap_err();
    assert!(matches!(err, PipelineError::FailedPipelineConstruction(ref msg) if msg.contains("rot13")));
}

#[test]
fn test_missing_input_file_is_semantic_error() {
    let fx = Fixture::new();
    let reader = fx.reader_config("reader.cfg", 4);
    let writer = fx.writer_config("writer.cfg", 4, None);
    let config = fx.run_config(
        "run.cfg",
        &fx.path("absent.bin"),
        &fx.path("out.bin"),
        &[("file_reader", &reader), ("file_writer", &writer)],
    );

    let err = run(&config).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Semantic);
}

#[test]
fn test_unopenable_output_is_invalid_output_stream() {
    let fx = Fixture::new();
    let input = fx.write("in.bin", [1u8, 2]);
    let reader = fx.reader_config("reader.cfg", 4);
    let writer = fx.writer_config("writer.cfg", 4, None);
    let config = fx.run_config(
        "run.cfg",
        &input,
        &fx.path("missing_dir").join("out.bin"),
        &[("file_reader", &reader), ("file_writer", &writer)],
    );

    let err = run(&config).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidOutputStream);
}

#[test]
fn test_directory_as_input_is_invalid_input_stream() {
    let fx = Fixture::new();
    let input_dir = fx.path("in_dir");
    fs::create_dir(&input_dir).unwrap();
    let output = fx.path("out.bin");
    let reader = fx.reader_config("reader.cfg", 4);
    let writer = fx.writer_config("writer.cfg", 4, None);
    let config = fx.run_config(
        "run.cfg",
        &input_dir,
        &output,
        &[("file_reader", &reader), ("file_writer", &writer)],
    );

    let err = run(&config).unwrap_err();

    assert_eq!(err.category(), ErrorCategory::InvalidInputStream);
    assert!(!output.exists());
}

#[test]
fn test_missing_run_config_is_config_read_error() {
    let fx = Fixture::new();
    let err = run(&fx.path("nope.cfg")).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ConfigRead);
}

#[test]
fn test_unknown_run_config_key_is_grammar_error() {
    let fx = Fixture::new();
    let config = fx.write("run.cfg", "input_file = a\ncolour = blue\n");
    let err = run(&config).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Grammar);
}

//==================================================================================
// 3. Data Flow & Exchange Types
//==================================================================================

#[test]
fn test_random_round_trip_with_inverted_table() {
    let fx = Fixture::new();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for (case, &(reader_size, writer_size, accept)) in [
        (1, 1, None),
        (3, 7, None),
        (4096, 16, None),
        (5, 3, Some("word")),
        (2, 9, Some("word,byte")),
    ]
    .iter()
    .enumerate()
    {
        let table = random_table(&mut rng);
        let len = rng.random_range(0..2000);
        let input = random_bytes(&mut rng, len);

        let (forward, encoded) = fx.substitution_run(
            &format!("fwd{}", case),
            &input,
            &table.to_string(),
            reader_size,
            writer_size,
            accept,
        );
        run(&forward).unwrap();

        let mut expected = input.clone();
        table.substitute_in_place(&mut expected);
        let encoded_bytes = fs::read(&encoded).unwrap();
        assert_eq!(encoded_bytes, expected, "case {}", case);

        let (backward, decoded) = fx.substitution_run(
            &format!("bwd{}", case),
            &encoded_bytes,
            &table.inverted().to_string(),
            writer_size,
            reader_size,
            accept,
        );
        run(&backward).unwrap();
        assert_eq!(fs::read(&decoded).unwrap(), input, "case {}", case);
    }
}

#[test]
fn test_word_exchange_keeps_odd_trailing_byte() {
    let fx = Fixture::new();
    let input = vec![0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70];
    let (config, output) = fx.substitution_run(
        "odd",
        &input,
        "0x10=>0x70\n0x70=>0x10\n",
        3,
        4,
        Some("word"),
    );

    let report = run(&config).unwrap();

    assert_eq!(
        fs::read(&output).unwrap(),
        vec![0x70, 0x20, 0x30, 0x40, 0x50, 0x60, 0x10]
    );
    assert_eq!(report.stages[1].input_exchange, Some(ExchangeType::Word));
    assert_eq!(report.stages[2].input_exchange, Some(ExchangeType::Word));
    assert_eq!(report.bytes_written, 7);
    assert!(report.links.iter().all(|link| link.exchange == ExchangeType::Word));
}

#[test]
fn test_default_negotiation_selects_byte() {
    let fx = Fixture::new();
    let (config, _) = fx.substitution_run("neg", &[1, 2, 3], "0x01=>0x01\n", 2, 2, None);

    let report = run(&config).unwrap();

    assert_eq!(report.stages[0].input_exchange, None);
    assert_eq!(report.stages[1].input_exchange, Some(ExchangeType::Byte));
    assert_eq!(report.stages[2].input_exchange, Some(ExchangeType::Byte));
}

#[test]
fn test_two_transforms_compose() {
    let fx = Fixture::new();
    let input: Vec<u8> = (0..=u8::MAX).cycle().take(1000).collect();
    let input_path = fx.write("in.bin", &input);
    let output = fx.path("out.bin");
    let reader = fx.reader_config("reader.cfg", 64);
    let there = fx.substitutor_config("there.cfg", "0x00=>0xff\n0xff=>0x00\n", None);
    let back = fx.substitutor_config("back.cfg", "0xff=>0x00\n0x00=>0xff\n", Some("word"));
    let writer = fx.writer_config("writer.cfg", 100, None);
    let config = fx.run_config(
        "run.cfg",
        &input_path,
        &output,
        &[
            ("file_reader", &reader),
            ("substitutor", &there),
            ("substitutor", &back),
            ("file_writer", &writer),
        ],
    );

    let report = run(&config).unwrap();

    assert_eq!(fs::read(&output).unwrap(), input);
    assert_eq!(report.stages.len(), 4);
    assert!(report.stages.iter().all(|s| s.stats.bytes_out == 1000));
}

#[test]
fn test_writer_emits_configured_chunk_sizes() {
    let fx = Fixture::new();
    let (config, _) = fx.substitution_run("chunks", &[], "0x01=>0x01\n", 3, 4, None);
    let manager = PipelineManager::from_config_file(&config).unwrap();
    let mut chain = manager.build_chain().unwrap();

    let recorder = Recorder::default();
    let input: Vec<u8> = (1..=10).collect();
    chain
        .attach_streams(Box::new(io::Cursor::new(input.clone())), Box::new(recorder.clone()))
        .unwrap();
    chain.execute().unwrap();

    let sizes: Vec<usize> = recorder.writes.borrow().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
    assert_eq!(recorder.bytes(), input);
}

#[test]
fn test_read_failure_is_reported_as_reading_error() {
    struct Failing;
    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "device gone"))
        }
    }

    let fx = Fixture::new();
    let (config, _) = fx.substitution_run("readfail", &[], "0x01=>0x01\n", 3, 4, None);
    let mut chain = PipelineManager::from_config_file(&config)
        .unwrap()
        .build_chain()
        .unwrap();
    chain
        .attach_streams(Box::new(Failing), Box::new(Recorder::default()))
        .unwrap();

    let err = chain.execute().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::FailedToRead);
    assert_eq!(chain.stage(0).unwrap().state(), StageState::Failed);
}

//==================================================================================
// 4. Custom Stage Kinds
//==================================================================================

/// A reader that only offers the word view of its input.
struct WordSource {
    state: StageState,
    port: SharedPort,
    input: Option<Box<dyn Read>>,
}

impl WordSource {
    fn boxed() -> Box<dyn Stage> {
        Box::new(Self {
            state: StageState::Unconfigured,
            port: OutputPort::shared(8),
            input: None,
        })
    }
}

impl Stage for WordSource {
    fn id(&self) -> &'static str {
        "word_source"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::READER
    }

    fn state(&self) -> StageState {
        self.state
    }

    fn set_config(&mut self, _path: &Path) -> Result<(), PipelineError> {
        self.state = StageState::Configured;
        Ok(())
    }

    fn input_types(&self) -> &[ExchangeType] {
        &[]
    }

    fn output_types(&self) -> &[ExchangeType] {
        &[ExchangeType::Word]
    }

    fn mediator(&mut self, exchange: ExchangeType) -> Result<Mediator, PipelineError> {
        Ok(Mediator::bind(&self.port, exchange))
    }

    fn set_producer(&mut self, _: StageId, _: &mut dyn Stage) -> Result<ExchangeType, PipelineError> {
        Err(PipelineError::FailedPipelineConstruction("no producer".into()))
    }

    fn set_consumer(&mut self, _: StageId) -> Result<(), PipelineError> {
        self.state = StageState::Wired;
        Ok(())
    }

    fn attach_input(&mut self, input: Box<dyn Read>) -> Result<(), PipelineError> {
        self.input = Some(input);
        Ok(())
    }

    fn execute(&mut self, mut downstream: Downstream<'_>) -> Result<(), PipelineError> {
        let mut data = Vec::new();
        if let Some(input) = self.input.as_mut() {
            input.read_to_end(&mut data).unwrap();
        }
        self.port.borrow_mut().put(&data)?;
        mediator::feed_downstream(&self.port, &mut downstream)?;
        mediator::finish_downstream(&self.port, &mut downstream)?;
        self.state = StageState::Finished;
        Ok(())
    }

    fn stats(&self) -> StageStats {
        StageStats::default()
    }
}

fn word_source_registry() -> StageRegistry {
    let mut registry = StageRegistry::default();
    registry.register("word_source", Capabilities::READER, WordSource::boxed);
    registry
}

#[test]
fn test_word_only_producer_negotiates_word() {
    let fx = Fixture::new();
    let input = fx.write("in.bin", [0xAAu8, 0xBB, 0xCC]);
    let output = fx.path("out.bin");
    let source = fx.write("source.cfg", "");
    let writer = fx.writer_config("writer.cfg", 2, None);
    let config = fx.run_config(
        "run.cfg",
        &input,
        &output,
        &[("word_source", &source), ("file_writer", &writer)],
    );

    let report = PipelineManager::with_registry(&config, word_source_registry())
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(report.stages[1].input_exchange, Some(ExchangeType::Word));
    assert_eq!(fs::read(&output).unwrap(), vec![0xAA, 0xBB, 0xCC]);
}

#[test]
fn test_no_common_exchange_type_fails_construction() {
    let fx = Fixture::new();
    let input = fx.write("in.bin", [1u8, 2]);
    let output = fx.path("out.bin");
    let source = fx.write("source.cfg", "");
    let writer = fx.writer_config("writer.cfg", 2, Some("byte"));
    let config = fx.run_config(
        "run.cfg",
        &input,
        &output,
        &[("word_source", &source), ("file_writer", &writer)],
    );

    let err = PipelineManager::with_registry(&config, word_source_registry())
        .unwrap()
        .run()
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::FailedPipelineConstruction);
    assert!(!output.exists());
}

/// A last stage that either ignores its producer entirely or drains data but
/// never acknowledges end of stream.
struct Sink {
    drains: bool,
    state: StageState,
    producer: Option<Mediator>,
}

impl Sink {
    fn stalled() -> Box<dyn Stage> {
        Box::new(Self {
            drains: false,
            state: StageState::Unconfigured,
            producer: None,
        })
    }

    fn endless() -> Box<dyn Stage> {
        Box::new(Self {
            drains: true,
            state: StageState::Unconfigured,
            producer: None,
        })
    }
}

impl Stage for Sink {
    fn id(&self) -> &'static str {
        "sink"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::WRITER
    }

    fn state(&self) -> StageState {
        self.state
    }

    fn set_config(&mut self, _path: &Path) -> Result<(), PipelineError> {
        self.state = StageState::Configured;
        Ok(())
    }

    fn input_types(&self) -> &[ExchangeType] {
        &[ExchangeType::Byte]
    }

    fn output_types(&self) -> &[ExchangeType] {
        &[]
    }

    fn mediator(&mut self, _exchange: ExchangeType) -> Result<Mediator, PipelineError> {
        Err(PipelineError::FailedPipelineConstruction("no consumer side".into()))
    }

    fn set_producer(&mut self, _: StageId, producer: &mut dyn Stage) -> Result<ExchangeType, PipelineError> {
        let mediator = mediator::negotiate_with("sink", &[ExchangeType::Byte], producer)?;
        let exchange = mediator.exchange_type();
        self.producer = Some(mediator);
        self.state = StageState::Wired;
        Ok(exchange)
    }

    fn set_consumer(&mut self, _: StageId) -> Result<(), PipelineError> {
        Err(PipelineError::FailedPipelineConstruction("no consumer".into()))
    }

    fn attach_output(&mut self, _output: Box<dyn Write>) -> Result<(), PipelineError> {
        Ok(())
    }

    fn execute(&mut self, _downstream: Downstream<'_>) -> Result<(), PipelineError> {
        self.state = StageState::Running;
        if self.drains {
            if let Some(mediator) = &self.producer {
                mediator.pull();
            }
        }
        Ok(())
    }

    fn stats(&self) -> StageStats {
        StageStats::default()
    }
}

fn sink_run(fx: &Fixture, factory: fn() -> Box<dyn Stage>) -> PipelineError {
    let input = fx.write("in.bin", [1u8, 2, 3, 4, 5]);
    let reader = fx.reader_config("reader.cfg", 2);
    let sink = fx.write("sink.cfg", "");
    let config = fx.run_config(
        "run.cfg",
        &input,
        &fx.path("out.bin"),
        &[("file_reader", &reader), ("sink", &sink)],
    );

    let mut registry = StageRegistry::default();
    registry.register("sink", Capabilities::WRITER, factory);
    PipelineManager::with_registry(&config, registry)
        .unwrap()
        .run()
        .unwrap_err()
}

#[test]
fn test_consumer_that_never_drains_is_invalid_argument() {
    let fx = Fixture::new();

    let err = sink_run(&fx, Sink::stalled);

    assert_eq!(err.category(), ErrorCategory::InvalidArgument);
    assert!(matches!(err, PipelineError::InvalidArgument(ref msg) if msg.contains("did not drain")));
}

#[test]
fn test_last_stage_that_never_finishes_is_invalid_argument() {
    let fx = Fixture::new();

    let err = sink_run(&fx, Sink::endless);

    assert_eq!(err.category(), ErrorCategory::InvalidArgument);
    assert!(matches!(err, PipelineError::InvalidArgument(ref msg) if msg.contains("before end of stream")));
}
