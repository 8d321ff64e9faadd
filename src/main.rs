use std::path;
use std::process;
use std::sync::Arc;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use chunk_sort::{
    ChunkMerging, ChunkSorting, ChunkStore, ExternalSorterBuilder, LogObserver, SortError, SortOptions, Terminator,
};

fn main() {
    let arg_parser = build_arg_parser();

    let result = match arg_parser.subcommand() {
        Some(("sort-chunk", args)) => {
            init_logger(args.value_of_t_or_exit("log_level"));
            sort_chunk(args)
        }
        Some(("merge-chunks", args)) => {
            init_logger(args.value_of_t_or_exit("log_level"));
            merge_chunks(args)
        }
        Some(("sort", args)) => {
            init_logger(args.value_of_t_or_exit("log_level"));
            sort(args)
        }
        _ => unreachable!("subcommand is required"),
    };

    if let Err(err) = result {
        log::error!("{}", err);
        process::exit(1);
    }
}

fn sort_chunk(args: &clap::ArgMatches) -> Result<(), SortError> {
    let chunk_id: usize = args.value_of_t_or_exit("chunk_id");
    let num_chunks: usize = args.value_of_t_or_exit("num_chunks");
    let input = args.value_of("input").expect("value is required");
    let dir = args.value_of("dir").expect("value has default");

    let options = sort_options(args);
    let store = ChunkStore::new(path::Path::new(dir), &options.chunk_extension);
    let report = ChunkSorting::new(options)
        .with_observer(Arc::new(LogObserver))
        .apply(chunk_id, num_chunks, path::Path::new(input), &store)?;

    log::info!(
        "chunk {} of {} sorted into {} ({} lines, {})",
        chunk_id,
        num_chunks,
        store.path_for(chunk_id).display(),
        report.lines,
        ByteSize::b(report.bytes)
    );

    return Ok(());
}

fn merge_chunks(args: &clap::ArgMatches) -> Result<(), SortError> {
    let num_chunks: usize = args.value_of_t_or_exit("num_chunks");
    let output = args.value_of("output").expect("value is required");
    let dir = args.value_of("dir").expect("value has default");

    let options = sort_options(args);
    let store = ChunkStore::new(path::Path::new(dir), &options.chunk_extension);
    let report = ChunkMerging::new(options)
        .with_observer(Arc::new(LogObserver))
        .apply(num_chunks, &store, path::Path::new(output))?;

    log::info!(
        "{} chunks merged into {} ({} lines, {})",
        num_chunks,
        output,
        report.lines,
        ByteSize::b(report.bytes)
    );

    return Ok(());
}

fn sort(args: &clap::ArgMatches) -> Result<(), SortError> {
    let input = args.value_of("input").expect("value is required");
    let output = args.value_of("output").expect("value is required");
    let num_chunks: usize = args.value_of_t_or_exit("num_chunks");
    let tmp_dir: Option<&str> = args.value_of("tmp_dir");
    let threads: Option<usize> = args
        .is_present("threads")
        .then(|| args.value_of_t_or_exit("threads"));

    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_options(sort_options(args))
        .with_observer(Arc::new(LogObserver));
    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    let sorter = sorter_builder.build()?;
    sorter.sort_file(path::Path::new(input), path::Path::new(output), num_chunks)?;

    return Ok(());
}

fn sort_options(args: &clap::ArgMatches) -> SortOptions {
    let terminator: TerminatorMode = args.value_of_t_or_exit("terminator");

    SortOptions::default()
        .with_chunk_overhead(byte_size(args, "overhead"))
        .with_write_buf_size(byte_size(args, "write_buffer"))
        .with_merge_block_size(byte_size(args, "block_size"))
        .with_terminator(match terminator {
            TerminatorMode::Any => Terminator::Canonical,
            TerminatorMode::Lf => Terminator::LfOnly,
        })
        .with_overwrite(args.is_present("force"))
}

fn byte_size(args: &clap::ArgMatches, name: &str) -> usize {
    parse_byte_size(args.value_of(name).expect("value has default")).expect("value is pre-validated")
}

fn parse_byte_size(value: &str) -> Result<usize, String> {
    let size = value
        .parse::<ByteSize>()
        .map_err(|err| format!("size format incorrect: {}", err))?;
    usize::try_from(size.as_u64()).map_err(|_| format!("size {} exceeds addressable memory", size))
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum TerminatorMode {
    Any,
    Lf,
}

impl TerminatorMode {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        TerminatorMode::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for TerminatorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <TerminatorMode as clap::ArgEnum>::from_str(s, false)
    }
}

fn validate_byte_size(value: &str) -> Result<(), String> {
    parse_byte_size(value).map(|_| ())
}

fn common_args() -> Vec<clap::Arg<'static>> {
    vec![
        clap::Arg::new("log_level")
            .short('l')
            .long("loglevel")
            .help("logging level")
            .takes_value(true)
            .default_value("info")
            .possible_values(LogLevel::possible_values()),
        clap::Arg::new("overhead")
            .long("overhead")
            .help("extra chunk buffer room for the line crossing the chunk end")
            .takes_value(true)
            .default_value("1MiB")
            .validator(validate_byte_size),
        clap::Arg::new("write_buffer")
            .long("write-buffer")
            .help("output buffer size")
            .takes_value(true)
            .default_value("16MiB")
            .validator(validate_byte_size),
        clap::Arg::new("block_size")
            .long("block-size")
            .help("merge read block size per chunk")
            .takes_value(true)
            .default_value("4MiB")
            .validator(validate_byte_size),
        clap::Arg::new("terminator")
            .long("terminator")
            .help("line terminators to recognize: any of LF, CR, CRLF, LFCR or LF only")
            .takes_value(true)
            .default_value("any")
            .possible_values(TerminatorMode::possible_values()),
        clap::Arg::new("force")
            .short('f')
            .long("force")
            .help("overwrite existing destination files"),
    ]
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("chunk-sort")
        .about("chunked external sorter for line oriented files")
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            clap::App::new("sort-chunk")
                .about("sorts one chunk of a file into a sorted chunk file")
                .arg(
                    clap::Arg::new("chunk_id")
                        .help("1-based chunk number")
                        .required(true)
                        .index(1),
                )
                .arg(
                    clap::Arg::new("num_chunks")
                        .help("number of chunks the file is split into")
                        .required(true)
                        .index(2),
                )
                .arg(
                    clap::Arg::new("input")
                        .help("file to be sorted")
                        .required(true)
                        .index(3),
                )
                .arg(
                    clap::Arg::new("dir")
                        .long("dir")
                        .help("directory to store the sorted chunk file")
                        .takes_value(true)
                        .default_value("."),
                )
                .args(common_args()),
        )
        .subcommand(
            clap::App::new("merge-chunks")
                .about("merges sorted chunk files into one sorted file")
                .arg(
                    clap::Arg::new("num_chunks")
                        .help("number of chunk files")
                        .required(true)
                        .index(1),
                )
                .arg(
                    clap::Arg::new("output")
                        .help("result file")
                        .required(true)
                        .index(2),
                )
                .arg(
                    clap::Arg::new("dir")
                        .long("dir")
                        .help("directory holding the sorted chunk files")
                        .takes_value(true)
                        .default_value("."),
                )
                .args(common_args()),
        )
        .subcommand(
            clap::App::new("sort")
                .about("sorts a file running both phases locally")
                .arg(
                    clap::Arg::new("input")
                        .short('i')
                        .long("input")
                        .help("file to be sorted")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("result file")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("num_chunks")
                        .short('n')
                        .long("chunks")
                        .help("number of chunks the file is split into")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("threads")
                        .short('t')
                        .long("threads")
                        .help("number of threads to use for parallel sorting")
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("tmp_dir")
                        .short('d')
                        .long("tmp-dir")
                        .help("directory to be used to store temporary data")
                        .takes_value(true),
                )
                .args(common_args()),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
