use crate::CLAP_STYLING;
use clap::arg;

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("veilcrawl")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("veilcrawl")
        .about("Anonymously snapshot a single website through Tor")
        .styles(CLAP_STYLING)
        .arg(arg!(<url> "The root URL to crawl (http:// is assumed when no scheme is given)"))
        .arg(
            arg!(-d --"depth" <DEPTH>)
                .required(false)
                .help("Maximum link depth to follow from the root page")
                .value_parser(clap::value_parser!(usize))
                .default_value("2"),
        )
        .arg(
            arg!(-t --"use-existing-tor" "Use an already running Tor instead of launching one")
                .required(false),
        )
        .arg(
            arg!(-o --"output" <PATH>)
                .required(false)
                .help("Where to write the crawl results")
                .default_value("output.json"),
        )
        .arg(
            arg!(--"format" <FORMAT>)
                .required(false)
                .help("Output format for the results")
                .value_parser(["json", "text"])
                .default_value("json"),
        )
        .arg(
            arg!(--"history-file" <PATH>)
                .required(false)
                .help("File that receives every visited URL, one per line")
                .default_value(".scrape_history"),
        )
        .arg(
            arg!(--"simplify" "Compress extracted page text with a local simplification service")
                .required(false),
        )
        .arg(
            arg!(--"simplify-endpoint" <URL>)
                .required(false)
                .help("Endpoint of the text simplification service")
                .requires("simplify"),
        )
        .arg(
            arg!(--"caption-endpoint" <URL>)
                .required(false)
                .help("Endpoint of a local image captioning service"),
        )
        .arg(
            arg!(--"tor-path" <PATH>)
                .required(false)
                .help("Tor executable to launch")
                .default_value("tor"),
        )
        .arg(
            arg!(--"delay-ms" <MS>)
                .required(false)
                .help("Pause between page requests, in milliseconds")
                .value_parser(clap::value_parser!(u64))
                .default_value("1000"),
        )
        .arg(arg!(-q --"quiet" "Suppress banner and progress output").required(false))
        .arg(arg!(-v --"verbose" "Enable debug logging").required(false))
}
