use clap::Parser;

/// This program replays a session of pairwise contests and prints the resulting rankings.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The session to replay, in JSON format: the rules, the topics with their
    /// items, the contests in the order they were played and the items deleted at the end.
    /// See the documentation of contest_engine::manual for the format.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference file containing the summary of a session in JSON format. If provided,
    /// ranker will check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the session will be written in
    /// JSON format to the given location. By default, it is printed on the standard output.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (default 5) The number of items listed in the top options of each topic.
    #[clap(long, value_parser, default_value_t = 5)]
    pub count: usize,

    /// (pairwise or ranked_preference) If specified, overrides the ranking method of the session.
    #[clap(long, value_parser)]
    pub method: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
