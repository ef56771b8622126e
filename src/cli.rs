use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "lexicon-reader",
    version,
    about = "A terminal EPUB reader that highlights vocabulary words and product links.",
    long_about = None
)]
pub struct Cli {
    /// Extra vocabulary word or phrase (repeatable)
    #[clap(short = 'w', long = "word", value_name = "WORD")]
    pub words: Vec<String>,

    /// Book id used to fetch per-book linked words
    #[clap(long, value_name = "ID")]
    pub book_id: Option<String>,

    /// Bearer token for the bookstore API
    #[clap(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Open at this 1-based location
    #[clap(short = 'l', long, value_name = "N")]
    pub location: Option<usize>,

    /// Print the annotated chapter at the location and exit
    #[clap(short, long)]
    pub dump: bool,

    /// Look up a word in the dictionary and exit
    #[clap(long, value_name = "WORD")]
    pub define: Option<String>,

    /// Submit a word to the feedback service and exit
    #[clap(long, value_name = "WORD")]
    pub submit: Option<String>,

    /// Do not contact the bookstore API for vocabulary data
    #[clap(long)]
    pub offline: bool,

    /// Use a specific configuration file
    #[clap(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[clap(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Enable debug output
    #[clap(long)]
    pub debug: bool,

    /// Ebook path
    #[clap(name = "EBOOK")]
    pub ebook: Option<PathBuf>,
}
