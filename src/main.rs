//! The `exfs2` tool: a single-operation-per-invocation CLI over an ExFS2
//! volume rooted at the current working directory.

use std::env;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::exit;

use exfs2::{ops, Error, Volume};

/// The operation selected on the command line, with its arguments.
enum Command {
	Ls { path: String },
	Add { local: PathBuf, target: String },
	Cat { path: String },
	Rm { path: String },
	Debug { path: String },
}

struct Args {
	prog: String,
	command: Command,
}

fn parse_args() -> Args {
	let mut iter = env::args();
	let prog = iter.next().unwrap_or_else(|| "exfs2".to_owned());

	let usage = || -> ! {
		eprintln!(
			"usage: {prog} --ls <path> | --add <local> <path> | --cat <path> | --rm <path> | --debug <path>"
		);
		exit(1);
	};

	let flag = iter.next().unwrap_or_else(|| usage());
	let command = match flag.as_str() {
		"--ls" => Command::Ls { path: iter.next().unwrap_or_else(|| usage()) },
		"--add" => {
			let local = iter.next().unwrap_or_else(|| usage());
			let target = iter.next().unwrap_or_else(|| usage());
			Command::Add { local: PathBuf::from(local), target }
		}
		"--cat" => Command::Cat { path: iter.next().unwrap_or_else(|| usage()) },
		"--rm" => Command::Rm { path: iter.next().unwrap_or_else(|| usage()) },
		"--debug" => Command::Debug { path: iter.next().unwrap_or_else(|| usage()) },
		_ => usage(),
	};

	Args { prog, command }
}

fn fail(prog: &str, err: impl std::fmt::Display) -> ! {
	eprintln!("{prog}: {err}");
	exit(1);
}

fn main() {
	let args = parse_args();
	let prog = args.prog;

	let cwd = env::current_dir().unwrap_or_else(|e| fail(&prog, e));
	let mut volume = Volume::open(&cwd).unwrap_or_else(|e| fail(&prog, e));
	let mut table = volume.inode_table();

	let result = match args.command {
		Command::Ls { path } => ops::list(&mut table, &path, &mut io::stdout()),
		Command::Add { local, target } => {
			let mut file = File::open(&local).unwrap_or_else(|e| fail(&prog, format!("{}: {e}", local.display())));
			ops::add(&mut table, &target, &mut file)
		}
		Command::Cat { path } => ops::extract(&mut table, &path, &mut io::stdout()),
		Command::Rm { path } => {
			if path == "/" || path.is_empty() {
				Err(Error::InvalidArgument("refusing to remove the root".into()))
			} else {
				ops::remove(&mut table, &path)
			}
		}
		Command::Debug { path } => ops::debug(&mut table, &path, &mut io::stdout()),
	};

	if let Err(e) = result {
		fail(&prog, e);
	}
}
