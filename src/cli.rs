use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "unzipdir")]
#[command(version)]
#[command(about = "Extract a ZIP archive into a directory", long_about = None)]
#[command(after_help = "Examples:\n  \
  unzipdir data.zip out        extract everything in data.zip into ./out\n  \
  RUST_LOG=debug unzipdir a.zip /tmp/a   also log each extracted entry")]
pub struct Cli {
    /// ZIP archive to read
    #[arg(value_name = "SRC")]
    pub src: PathBuf,

    /// Directory to extract into (created if missing)
    #[arg(value_name = "DEST")]
    pub dest: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_both_positionals() {
        let cli = Cli::try_parse_from(["unzipdir", "a.zip", "out/dir"]).unwrap();
        assert_eq!(cli.src, PathBuf::from("a.zip"));
        assert_eq!(cli.dest, PathBuf::from("out/dir"));
    }

    #[test]
    fn both_arguments_are_required() {
        let err = Cli::try_parse_from(["unzipdir", "a.zip"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        assert!(Cli::try_parse_from(["unzipdir"]).is_err());
        assert!(Cli::try_parse_from(["unzipdir", "a", "b", "c"]).is_err());
    }
}
