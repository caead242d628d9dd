//! This module defines the `Invocation` struct and the `Command` enum used to
//! parse the command line of the FAT explorer.
//!
//! The grammar follows single-dash flags:
//! `-f FILE [-i [PATH]] [-id N] [-l [PATH]] [-ld N] [-p PATH] [-s [PATH] DEST] [-n] [-v]...`.
//! Optional values are taken only when the next argument is not itself a flag.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Flags recognized on the command line.
const FLAGS: [&str; 11] = [
    "-f", "-i", "-id", "-l", "-ld", "-p", "-s", "-n", "-v", "-h", "--help",
];

/// Usage text printed by `-h`.
pub const USAGE: &str = "\
Usage: main -f FILE [OPTIONS]

Options:
  -f FILE          FAT volume image to open
  -i [PATH]        Print detailed information about PATH (volume summary if omitted)
  -id N            Depth of the -i listing (negative: unlimited, 0: the node only)
  -l [PATH]        List the names under PATH (root if omitted)
  -ld N            Depth of the -l listing (negative: unlimited, 0: the node only)
  -p PATH          Print the content of a file to the standard output
  -s [PATH] DEST   Extract PATH (root if omitted) to DEST
  -n               Skip the validation of the boot sector
  -v               Increase the log verbosity, can be repeated
  -h, --help       Print this help";

/// Errors raised while parsing the command line or preparing a command.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Missing arg: '{0}' expects a value.")]
    MissingValue(String),

    #[error("Arg parsing error: '{0}' expects an integer depth, got `{1}`.")]
    InvalidDepth(String, String),

    #[error("Unknown argument: {0:?}")]
    UnknownArgument(String),

    #[error("Filename not specified!")]
    MissingImage,

    #[error("Neither `{0}` nor its parent directory exist.")]
    MissingDestination(String),

    #[error("Can't write directory to file `{0}`.")]
    DirectoryToFile(String),
}

/// An action to run on the opened volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Detailed listing, with the volume summary when `path` is `None`.
    Info { path: Option<String>, depth: i32 },
    /// Names-only listing.
    List { path: Option<String>, depth: i32 },
    /// Copies a file to the standard output.
    Print { path: String },
    /// Extracts a file or a directory tree.
    Save { from: Option<String>, to: String },
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Path of the volume image
    pub image: Option<PathBuf>,
    /// Commands to run, in execution order: info, list, print, save
    pub commands: Vec<Command>,
    /// Whether to validate the boot sector
    pub validate: bool,
    /// Number of `-v` flags
    pub verbosity: usize,
    pub help: bool,
}

impl Invocation {
    /// Parses the arguments of the program, without the program name.
    ///
    /// # Parameters
    /// - `args`: The command-line arguments
    ///
    /// # Returns
    /// - `Ok(Invocation)` with the commands ordered as info, list, print, save
    ///
    /// # Errors
    /// - `CommandError::MissingValue` if a flag lacks its mandatory value
    /// - `CommandError::InvalidDepth` if a depth is not an integer
    /// - `CommandError::UnknownArgument` for anything else
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Result<Self, CommandError> {
        let args: Vec<String> = args.into_iter().collect();
        let mut image = None;
        let mut validate = true;
        let mut verbosity = 0;
        let mut help = false;
        let mut info: Option<Option<String>> = None;
        let mut list: Option<Option<String>> = None;
        let mut print = None;
        let mut save = None;
        let mut info_depth = -1;
        let mut list_depth = -1;

        let is_value = |i: usize| args.get(i).is_some_and(|arg| !FLAGS.contains(&arg.as_str()));
        let required = |i: usize, flag: &str| {
            args.get(i)
                .cloned()
                .ok_or_else(|| CommandError::MissingValue(flag.to_string()))
        };
        let depth = |i: usize, flag: &str| {
            let value = required(i, flag)?;
            value
                .trim()
                .parse::<i32>()
                .map_err(|_| CommandError::InvalidDepth(flag.to_string(), value))
        };

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "-f" => {
                    image = Some(PathBuf::from(required(i + 1, "-f")?));
                    i += 1;
                }
                "-id" => {
                    info_depth = depth(i + 1, "-id")?;
                    i += 1;
                }
                "-ld" => {
                    list_depth = depth(i + 1, "-ld")?;
                    i += 1;
                }
                "-i" => {
                    info = Some(is_value(i + 1).then(|| args[i + 1].clone()));
                    if is_value(i + 1) {
                        i += 1;
                    }
                }
                "-l" => {
                    list = Some(is_value(i + 1).then(|| args[i + 1].clone()));
                    if is_value(i + 1) {
                        i += 1;
                    }
                }
                "-p" => {
                    print = Some(required(i + 1, "-p")?);
                    i += 1;
                }
                "-s" => {
                    match (is_value(i + 1), is_value(i + 2)) {
                        (true, true) => {
                            save = Some((Some(args[i + 1].clone()), args[i + 2].clone()));
                            i += 2;
                        }
                        (true, false) => {
                            save = Some((None, args[i + 1].clone()));
                            i += 1;
                        }
                        (false, _) => return Err(CommandError::MissingValue(String::from("-s"))),
                    }
                }
                "-n" => validate = false,
                "-v" => verbosity += 1,
                "-h" | "--help" => help = true,
                other => return Err(CommandError::UnknownArgument(other.to_string())),
            }
            i += 1;
        }

        let mut commands = Vec::new();
        if let Some(path) = info {
            commands.push(Command::Info {
                path,
                depth: info_depth,
            });
        }
        if let Some(path) = list {
            commands.push(Command::List {
                path,
                depth: list_depth,
            });
        }
        if let Some(path) = print {
            commands.push(Command::Print { path });
        }
        if let Some((from, to)) = save {
            commands.push(Command::Save { from, to });
        }

        Ok(Invocation {
            image,
            commands,
            validate,
            verbosity,
            help,
        })
    }
}

/// Picks where an extracted node named `name` is written.
///
/// - `dest` does not exist: its parent must exist, and `dest` is the target.
/// - `dest` is a file and the node a directory: error.
/// - Otherwise the node goes to `dest/name`.
///
/// # Errors
/// - `CommandError::MissingDestination` if neither `dest` nor its parent exist
/// - `CommandError::DirectoryToFile` if a directory would overwrite a file
pub fn save_destination(dest: &Path, name: &str, is_dir: bool) -> Result<PathBuf, CommandError> {
    if !dest.exists() {
        return match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                Err(CommandError::MissingDestination(dest.display().to_string()))
            }
            _ => Ok(dest.to_path_buf()),
        };
    }

    if is_dir && fs::metadata(dest).is_ok_and(|meta| meta.is_file()) {
        return Err(CommandError::DirectoryToFile(dest.display().to_string()));
    }

    Ok(dest.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Invocation, CommandError> {
        Invocation::from_args(line.split_whitespace().map(String::from))
    }

    #[test]
    fn commands_run_in_fixed_order() {
        let invocation = parse("-s out -p a.txt -l -f disk.img -i").unwrap();

        assert_eq!(invocation.image, Some(PathBuf::from("disk.img")));
        assert_eq!(
            invocation.commands,
            [
                Command::Info {
                    path: None,
                    depth: -1
                },
                Command::List {
                    path: None,
                    depth: -1
                },
                Command::Print {
                    path: String::from("a.txt")
                },
                Command::Save {
                    from: None,
                    to: String::from("out")
                },
            ]
        );
        assert!(invocation.validate);
    }

    #[test]
    fn optional_paths_and_depths() {
        let invocation = parse("-f d.img -ld 2 -l /docs -i /docs/a -id 0").unwrap();

        assert_eq!(
            invocation.commands,
            [
                Command::Info {
                    path: Some(String::from("/docs/a")),
                    depth: 0
                },
                Command::List {
                    path: Some(String::from("/docs")),
                    depth: 2
                },
            ]
        );
    }

    #[test]
    fn save_takes_one_or_two_values() {
        let invocation = parse("-f d.img -s /docs out -n").unwrap();
        assert_eq!(
            invocation.commands,
            [Command::Save {
                from: Some(String::from("/docs")),
                to: String::from("out")
            }]
        );
        assert!(!invocation.validate);

        assert_eq!(
            parse("-f d.img -s -n").unwrap_err(),
            CommandError::MissingValue(String::from("-s"))
        );
    }

    #[test]
    fn verbosity_and_help() {
        let invocation = parse("-v -v -h").unwrap();
        assert_eq!(invocation.verbosity, 2);
        assert!(invocation.help);
        assert!(invocation.image.is_none());
    }

    #[test]
    fn invalid_arguments() {
        assert_eq!(
            parse("-f").unwrap_err(),
            CommandError::MissingValue(String::from("-f"))
        );
        assert_eq!(
            parse("-f d.img -id deep").unwrap_err(),
            CommandError::InvalidDepth(String::from("-id"), String::from("deep"))
        );
        assert_eq!(
            parse("-f d.img --tree").unwrap_err(),
            CommandError::UnknownArgument(String::from("--tree"))
        );
    }

    #[test]
    fn destination_rules() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();

        let fresh = dir.path().join("fresh");
        assert_eq!(save_destination(&fresh, "DOCS", true).unwrap(), fresh);
        assert_eq!(
            save_destination(dir.path(), "DOCS", true).unwrap(),
            dir.path().join("DOCS")
        );
        assert!(matches!(
            save_destination(&file, "DOCS", true),
            Err(CommandError::DirectoryToFile(_))
        ));
        assert!(matches!(
            save_destination(&dir.path().join("a/b"), "DOCS", false),
            Err(CommandError::MissingDestination(_))
        ));
    }
}
