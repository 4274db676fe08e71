use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("zenstatus")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("zenstatus")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(arg!(-v --"verbose" "Enable debug logging on stderr").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("audit")
                .about(
                    "Audit one or more sites for on-page SEO issues, optionally expanding each \
                seed through its sitemaps.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("The URL to audit")
                        .value_parser(clap::value_parser!(Url))
                        .conflicts_with("hosts-file"),
                )
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of URLs to audit")
                        .value_parser(clap::value_parser!(String))
                        .conflicts_with("url"),
                )
                .arg(
                    arg!(--"sitemap")
                        .required(false)
                        .help("Discover pages through each seed's sitemaps")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"sitemap-url" <URL>)
                        .required(false)
                        .help("Use this sitemap instead of discovering one (implies --sitemap)"),
                )
                .arg(
                    arg!(--"max-pages" <NUM>)
                        .required(false)
                        .help("Maximum pages taken from each seed's sitemaps (1-10000)")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("100"),
                )
                .arg(
                    arg!(--"batch-size" <NUM>)
                        .required(false)
                        .help("Pages audited per batch")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("300"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Page fetch timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("15"),
                )
                .arg(
                    arg!(--"retries" <NUM>)
                        .required(false)
                        .help("Total fetch attempts on timeouts and connection failures")
                        .value_parser(clap::value_parser!(u32))
                        .default_value("2"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(String)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, csv, markdown")
                        .value_parser(["text", "json", "csv", "markdown"])
                        .default_value("text"),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_defaults() {
        let matches = command_argument_builder()
            .try_get_matches_from(["zenstatus", "audit", "-u", "https://example.com"])
            .unwrap();
        let (name, audit) = matches.subcommand().unwrap();
        assert_eq!(name, "audit");
        assert_eq!(audit.get_one::<usize>("max-pages"), Some(&100));
        assert_eq!(audit.get_one::<usize>("batch-size"), Some(&300));
        assert_eq!(audit.get_one::<u64>("timeout"), Some(&15));
        assert_eq!(audit.get_one::<u32>("retries"), Some(&2));
        assert_eq!(audit.get_one::<String>("format").map(String::as_str), Some("text"));
        assert!(!audit.get_flag("sitemap"));
    }

    #[test]
    fn test_url_conflicts_with_hosts_file() {
        let result = command_argument_builder().try_get_matches_from([
            "zenstatus",
            "audit",
            "-u",
            "https://example.com",
            "-H",
            "hosts.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let result = command_argument_builder().try_get_matches_from([
            "zenstatus",
            "audit",
            "-u",
            "https://example.com",
            "-f",
            "html",
        ]);
        assert!(result.is_err());
    }
}
