/*
    Shared fixtures for unit tests: a runtime with a handful of natives, and handles to observe them.

    Natives:
    * words - depletable source, `n` words from alpha..epsilon (-1 for all)
    * say - source, repeats its `text`
    * counted - source, bumps a counter and yields the new count
    * upper - pipe, uppercases every item
    * count - pipe, yields the number of items it got and counts its invocations
    * join - pipe, joins items with `sep`
    * fail - pipe that always errors
    * log - simple spout, records every callback
    * gather - aggregated spout, records every callback
    * broken - spout that always errors
*/
use crate::imports::*;
use crate::registry::closures::{FnPipe, FnSource, FnSpout};
use crate::services::io::BufferedInteraction;
use crate::services::persist::MemoryWriter;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

const WORDS: [&str; 5] = ["alpha", "beta", "gamma", "delta", "epsilon"];

/// Each entry is one callback: the calls it was handed.
#[derive(Clone, Default)]
pub struct SpoutLog(Arc<Mutex<Vec<Vec<SpoutCall>>>>);

impl SpoutLog {
    pub fn callbacks(&self) -> Vec<Vec<SpoutCall>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The items of every call, in callback order.
    pub fn items(&self) -> Vec<Vec<String>> {
        self.callbacks()
            .into_iter()
            .flatten()
            .map(|call| call.items)
            .collect()
    }
}

fn spout(name: &str, aggregated: bool) -> (Arc<dyn Spout>, SpoutLog) {
    let log = SpoutLog::default();
    let record = log.clone();
    let spout = FnSpout::new(name, Signature::new(), move |_, calls| {
        record.0.lock().unwrap_or_else(PoisonError::into_inner).push(calls);
        Ok(())
    });
    let spout = if aggregated { spout.aggregated() } else { spout };
    (Arc::new(spout), log)
}

pub fn recording_spout(name: &str) -> (Arc<dyn Spout>, SpoutLog) {
    spout(name, false)
}

pub fn aggregated_spout(name: &str) -> (Arc<dyn Spout>, SpoutLog) {
    spout(name, true)
}

pub struct Rig {
    pub runtime: Arc<Runtime>,
    /// Times `counted` produced a value.
    pub counted: Arc<AtomicUsize>,
    /// Times the `count` pipe was invoked.
    pub invocations: Arc<AtomicUsize>,
    pub log: SpoutLog,
    pub gather: SpoutLog,
    pub io: BufferedInteraction,
    pub writer: MemoryWriter,
}

impl Rig {
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

fn natives(counted: Arc<AtomicUsize>, invocations: Arc<AtomicUsize>) -> (Registry, SpoutLog, SpoutLog) {
    let mut natives = Registry::new();

    let words = FnSource::new(
        "words",
        Signature::new().param(Param::new("n", ParamType::Int).default(1)),
        |_, args| {
            let n = args.get_required_i64("n")?;
            let take = if n < 0 { WORDS.len() } else { n as usize };
            Ok(WORDS.iter().cycle().take(take).map(|w| w.to_string()).collect())
        },
    )
    .depletable();
    natives.add_source(words).unwrap();

    let say = FnSource::new(
        "say",
        Signature::new().param(Param::new("text", ParamType::String)),
        |_, args| Ok(vec![args.get_required_string("text")?]),
    );
    natives.add_source(say).unwrap();

    let counter = counted.clone();
    let counted = FnSource::new("counted", Signature::new(), move |_, _| {
        let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(vec![count.to_string()])
    });
    natives.add_source(counted).unwrap();

    let upper = FnPipe::new("upper", Signature::new(), |items, _| {
        Ok(items.iter().map(|item| item.to_uppercase()).collect())
    });
    natives.add_pipe(upper).unwrap();

    let count = FnPipe::new("count", Signature::new(), move |items, _| {
        invocations.fetch_add(1, Ordering::SeqCst);
        Ok(vec![items.len().to_string()])
    });
    natives.add_pipe(count).unwrap();

    let join = FnPipe::new(
        "join",
        Signature::new().param(Param::new("sep", ParamType::String).default(",")),
        |items, args| Ok(vec![items.join(&args.get_required_string("sep")?)]),
    );
    natives.add_pipe(join).unwrap();

    let fail = FnPipe::new("fail", Signature::new(), |_, _| anyhow::bail!("deliberate failure"));
    natives.add_pipe(fail).unwrap();

    let (log_spout, log) = recording_spout("log");
    natives.add_shared_spout(log_spout).unwrap();
    let (gather_spout, gather) = aggregated_spout("gather");
    natives.add_shared_spout(gather_spout).unwrap();

    let broken = FnSpout::new("broken", Signature::new(), |_, _| anyhow::bail!("spout exploded"));
    natives.add_spout(broken).unwrap();

    (natives, log, gather)
}

pub fn rig_with(settings: Settings) -> Rig {
    let counted = Arc::new(AtomicUsize::new(0));
    let invocations = Arc::new(AtomicUsize::new(0));
    let (natives, log, gather) = natives(counted.clone(), invocations.clone());

    let io = BufferedInteraction::new();
    let writer = MemoryWriter::new();
    let mut services = PipelineServices::new();
    services.add_io(io.clone());

    let runtime = Runtime::builder()
        .settings(settings)
        .natives(natives)
        .services(services)
        .writer(writer.clone())
        .build();

    Rig {
        runtime,
        counted,
        invocations,
        log,
        gather,
        io,
        writer,
    }
}

pub fn rig() -> Rig {
    rig_with(Settings::default())
}

pub fn runtime() -> Arc<Runtime> {
    rig().runtime
}

/// A direct context in channel `test`.
pub fn context(runtime: Arc<Runtime>) -> Context {
    Context::new(runtime, Origin::direct("tester")).with_channel("test")
}
