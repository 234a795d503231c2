//! gitwiki - a Git-backed wiki
//!
//! Command-line front end to the wiki core.

use std::error::Error;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use serde::Serialize;

use gitwiki::logger::Logger;
use gitwiki::storage::{CommitInfo, CommitOutcome, GitRepository, VersionControl};
use gitwiki::wiki::{UploadedFile, Wiki, WikiConfig};

type CliResult = Result<(), Box<dyn Error>>;

struct Options {
    root: Option<PathBuf>,
    verbose: bool,
    json: bool,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let mut options = Options {
        root: None,
        verbose: false,
        json: false,
    };
    let mut rest = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" | "--dir" if rest.is_empty() => {
                i += 1;
                if i < args.len() {
                    options.root = Some(PathBuf::from(&args[i]));
                }
            }
            "-v" | "--verbose" if rest.is_empty() => options.verbose = true,
            "--json" if rest.is_empty() => options.json = true,
            "-h" | "--help" if rest.is_empty() => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" if rest.is_empty() => {
                println!("gitwiki v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            arg => rest.push(arg.to_string()),
        }
        i += 1;
    }

    if Logger::init(options.verbose).is_err() {
        eprintln!("Warning: logger already installed");
    }

    if rest.is_empty() {
        print_help();
        return ExitCode::FAILURE;
    }

    let mut config = WikiConfig::from_env();
    if let Some(root) = &options.root {
        config.root = root.clone();
    }

    let wiki = match Wiki::open(config) {
        Ok(wiki) => wiki,
        Err(e) => {
            eprintln!("Error opening wiki: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&wiki, &options, rest) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    println!("gitwiki - a Git-backed wiki");
    println!();
    println!("Usage: gitwiki [OPTIONS] COMMAND [ARGS]");
    println!();
    println!("Options:");
    println!("  -d, --dir PATH         Wiki repository (default: $WIKI_HOME or ~/wiki)");
    println!("  -v, --verbose          Log debug output to stderr");
    println!("  --json                 Print JSON where a command has structured output");
    println!("  -h, --help             Show this help message");
    println!("  --version              Show version");
    println!();
    println!("Commands:");
    println!("  show PAGE [--rev REV]          Render a page to HTML");
    println!("  raw PAGE [--rev REV]           Print the markdown source of a page");
    println!("  edit PAGE [-m MSG]             Replace a page with stdin");
    println!("  append PAGE [-m MSG]           Append stdin to a page");
    println!("  delete PAGE                    Delete a page and its attachments");
    println!("  history PAGE                   List the commits that touched a page");
    println!("  diff PAGE REV                  Changes to a page since REV");
    println!("  list [--flat]                  List pages");
    println!("  attach PAGE FILE [--name NAME] Upload an attachment");
    println!("  detach PAGE NAME               Remove an attachment");
    println!("  files PAGE                     List attachments");
    println!("  search PATTERN                 Search committed pages");
    println!("  branches                       List branches");
    println!("  branch NAME                    Create a branch at HEAD");
    println!("  checkout NAME                  Switch branches");
    println!("  merge NAME                     Merge a branch into the current one");
    println!("  revert REV                     Restore the wiki as it was at REV");
    println!("  archive [FILE] [--rev REV]     Write a .tar.gz of the wiki (default: wiki.tar.gz)");
}

/// Remove `--flag VALUE` from `args`.
fn take_value(args: &mut Vec<String>, names: &[&str]) -> Option<String> {
    let pos = args.iter().position(|a| names.contains(&a.as_str()))?;
    args.remove(pos);
    if pos < args.len() {
        Some(args.remove(pos))
    } else {
        None
    }
}

fn take_flag(args: &mut Vec<String>, name: &str) -> bool {
    match args.iter().position(|a| a == name) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn arg(args: &[String], index: usize, what: &str) -> Result<String, Box<dyn Error>> {
    args.get(index)
        .cloned()
        .ok_or_else(|| format!("missing {}", what).into())
}

fn read_stdin() -> Result<String, Box<dyn Error>> {
    let mut content = String::new();
    std::io::stdin().read_to_string(&mut content)?;
    Ok(content)
}

fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_outcome(outcome: &CommitOutcome) {
    match outcome {
        CommitOutcome::Committed(id) => println!("committed {}", id.short()),
        CommitOutcome::NothingToCommit => println!("nothing to commit"),
        CommitOutcome::Failed(reason) => eprintln!("commit failed: {}", reason),
    }
}

fn print_commits(commits: &[CommitInfo]) {
    for commit in commits {
        println!(
            "{} {} {:<16} {}",
            commit.id.short(),
            commit.timestamp.format("%Y-%m-%d %H:%M"),
            commit.author_name,
            commit.summary()
        );
    }
}

fn run(wiki: &Wiki<GitRepository>, options: &Options, mut args: Vec<String>) -> CliResult {
    let command = args.remove(0);
    let rev = take_value(&mut args, &["--rev", "-r"]);
    let message = take_value(&mut args, &["-m", "--message"]);

    match command.as_str() {
        "show" | "raw" => {
            let basename = arg(&args, 0, "page")?;
            let page = match rev {
                Some(spec) => wiki.page_at(&basename, wiki.resolve_revision(&spec)?)?,
                None => wiki.page(&basename)?,
            };
            if command == "show" {
                println!("{}", page.body()?);
            } else {
                print!("{}", page.raw_body()?);
            }
        }
        "edit" => {
            let mut page = wiki.page(&arg(&args, 0, "page")?)?;
            let outcome = page.update(&read_stdin()?, message.as_deref())?;
            print_outcome(&outcome);
        }
        "append" => {
            let mut page = wiki.page(&arg(&args, 0, "page")?)?;
            let outcome = page.append(&read_stdin()?, message.as_deref())?;
            print_outcome(&outcome);
        }
        "delete" => {
            let mut page = wiki.page(&arg(&args, 0, "page")?)?;
            print_outcome(&page.delete()?);
        }
        "history" => {
            let page = wiki.page(&arg(&args, 0, "page")?)?;
            if options.json {
                print_json(&page.history()?)?;
            } else {
                print_commits(page.history()?);
            }
        }
        "diff" => {
            let page = wiki.page(&arg(&args, 0, "page")?)?;
            let since = wiki.resolve_revision(&arg(&args, 1, "revision")?)?;
            print!("{}", page.delta(since)?);
        }
        "list" => {
            let recursive = !take_flag(&mut args, "--flat");
            let pages = wiki.pages_with(recursive)?;
            if options.json {
                print_json(&pages)?;
            } else {
                for page in pages {
                    println!("{}", page.basename);
                }
            }
        }
        "attach" => {
            let name = take_value(&mut args, &["--name", "-n"]);
            let mut page = wiki.page(&arg(&args, 0, "page")?)?;
            let path = PathBuf::from(arg(&args, 1, "file")?);
            let upload = UploadedFile::new(path.to_string_lossy(), fs::read(&path)?);
            let stored = page.save_file(&upload, name.as_deref())?;
            println!("stored {}", stored.name);
            print_outcome(&stored.outcome);
        }
        "detach" => {
            let mut page = wiki.page(&arg(&args, 0, "page")?)?;
            print_outcome(&page.delete_file(&arg(&args, 1, "attachment name")?)?);
        }
        "files" => {
            let page = wiki.page(&arg(&args, 0, "page")?)?;
            let files = page.attachments()?.unwrap_or_default();
            if options.json {
                let summaries: Vec<_> = files.iter().map(|f| f.summary()).collect();
                print_json(&summaries)?;
            } else {
                for file in files {
                    println!("{:<32} {:>10}  {}", file.name(), file.size(), file.link_path());
                }
            }
        }
        "search" => {
            let matches = wiki.search(&arg(&args, 0, "pattern")?)?;
            if options.json {
                print_json(&matches)?;
            } else {
                for m in matches {
                    println!("{}:{}: {}", m.path, m.line_number, m.line);
                }
            }
        }
        "branches" => {
            let current = wiki.repo().current_branch_name()?;
            for branch in wiki.repo().list_branches()? {
                let marker = if branch.as_str() == current { "*" } else { " " };
                println!("{} {}", marker, branch);
            }
        }
        "branch" => {
            let branch = wiki.repo().create_branch(&arg(&args, 0, "branch name")?)?;
            println!("created branch {}", branch);
        }
        "checkout" => {
            let name = arg(&args, 0, "branch name")?;
            wiki.repo().checkout_branch(&name)?;
            println!("switched to {}", name);
        }
        "merge" => match wiki.repo().merge_branch(&arg(&args, 0, "branch name")?)? {
            Some(id) => println!("merged as {}", id.short()),
            None => println!("already up to date"),
        },
        "revert" => {
            let target = wiki.resolve_revision(&arg(&args, 0, "revision")?)?;
            let id = wiki.repo().revert_to(target)?;
            println!("reverted as {}", id.short());
        }
        "archive" => {
            let target = match rev {
                Some(spec) => Some(wiki.resolve_revision(&spec)?),
                None => None,
            };
            let output = args.first().map_or_else(|| PathBuf::from("wiki.tar.gz"), PathBuf::from);
            let bytes = wiki.archive(target)?;
            fs::write(&output, &bytes)?;
            println!("wrote {} ({} bytes)", output.display(), bytes.len());
        }
        other => return Err(format!("unknown command: {} (see --help)", other).into()),
    }
    Ok(())
}
