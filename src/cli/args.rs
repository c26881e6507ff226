use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "cdrview",
    version,
    about = "progressive call-detail report fetcher and CSV exporter",
    long_about = "cdrview initializes a progressive report query, loads all pages in concurrent batches, and exports the result set to CSV.\n\nExamples:\n  cdrview -U https://reports.example.com/api -s \"2026-08-01 00:00:00\" -e \"2026-08-02 00:00:00\"\n  cdrview -U https://reports.example.com/api -s 2026-08-01 -e 2026-08-02 --agent alice -o report.csv\n  cdrview -U https://reports.example.com/api -s 2026-08-01 -e 2026-08-02 --list agents\n\nTip: Use --config to persist the server address and keep invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'U',
        long = "url",
        value_name = "URL",
        help_heading = "Connection",
        help = "Base URL of the report API."
    )]
    pub url: Option<String>,

    #[arg(
        short = 'C',
        long = "config",
        value_name = "FILE",
        help_heading = "Connection",
        help = "Path to config file (defaults to ~/.cdrview/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        long = "timeout",
        value_name = "SECONDS",
        help_heading = "Connection",
        help = "Per-request timeout in seconds."
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 's',
        long = "start",
        value_name = "TIME",
        help_heading = "Time Range",
        help = "Start of the report time range (sent to the server as-is)."
    )]
    pub start: Option<String>,

    #[arg(
        short = 'e',
        long = "end",
        value_name = "TIME",
        help_heading = "Time Range",
        help = "End of the report time range (sent to the server as-is)."
    )]
    pub end: Option<String>,

    #[arg(
        long = "contact",
        value_name = "NUMBER",
        help_heading = "Filters",
        help = "Filter by contact number (digits, optional leading +)."
    )]
    pub contact: Option<String>,

    #[arg(
        long = "agent",
        value_name = "NAME",
        help_heading = "Filters",
        help = "Filter by agent name."
    )]
    pub agent: Option<String>,

    #[arg(
        long = "extension",
        value_name = "EXT",
        help_heading = "Filters",
        help = "Filter by extension."
    )]
    pub extension: Option<String>,

    #[arg(
        long = "queue",
        value_name = "NAME",
        help_heading = "Filters",
        help = "Filter by queue or campaign name."
    )]
    pub queue: Option<String>,

    #[arg(
        long = "record-type",
        value_name = "TYPE",
        help_heading = "Filters",
        help = "Filter by record type."
    )]
    pub record_type: Option<String>,

    #[arg(
        long = "disposition",
        value_name = "VALUE",
        help_heading = "Filters",
        help = "Filter by agent disposition."
    )]
    pub disposition: Option<String>,

    #[arg(
        long = "sub-disposition1",
        value_name = "VALUE",
        help_heading = "Filters",
        help = "Filter by sub disposition 1."
    )]
    pub sub_disposition1: Option<String>,

    #[arg(
        long = "sub-disposition2",
        value_name = "VALUE",
        help_heading = "Filters",
        help = "Filter by sub disposition 2."
    )]
    pub sub_disposition2: Option<String>,

    #[arg(
        long = "status",
        value_name = "VALUE",
        help_heading = "Filters",
        help = "Filter by call status."
    )]
    pub status: Option<String>,

    #[arg(
        long = "campaign-type",
        value_name = "VALUE",
        help_heading = "Filters",
        help = "Filter by campaign type."
    )]
    pub campaign_type: Option<String>,

    #[arg(
        long = "country",
        value_name = "VALUE",
        help_heading = "Filters",
        help = "Filter by country."
    )]
    pub country: Option<String>,

    #[arg(
        long = "transferred",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        help_heading = "Filters",
        help = "Filter by transfer flag."
    )]
    pub transferred: Option<bool>,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "CSV output path (defaults to final_report_<timestamp>.csv)."
    )]
    pub output: Option<String>,

    #[arg(
        long = "preview",
        help_heading = "Output",
        help = "Stream the loaded table to the terminal."
    )]
    pub preview: bool,

    #[arg(
        long = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        long = "list",
        value_name = "KIND",
        help_heading = "Lookups",
        help = "List known values instead of running a query: agents, queues, campaigns, or dispositions (requires --start/--end)."
    )]
    pub list: Option<String>,
}
