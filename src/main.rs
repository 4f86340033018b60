use std::{env, fs, process::ExitCode};

use tracing::{error, info};

use snes_as::{assemble, Options, Segment};

const USAGE: &str = "usage: snes-as [-J|--jumps|--no-jumps] [-v] <file>...";

fn main() -> ExitCode {
	let mut options = Options::default();
	let mut verbose = false;
	let mut files = Vec::new();
	for arg in env::args().skip(1) {
		match arg.as_str() {
			"-J" | "--jumps" => options.fix_jumps = true,
			"--no-jumps" => options.fix_jumps = false,
			"-v" | "--verbose" => verbose = true,
			"-h" | "--help" => {
				println!("{USAGE}");
				return ExitCode::SUCCESS;
			}
			_ => files.push(arg),
		}
	}

	tracing_subscriber::fmt()
		.compact()
		.without_time()
		.with_max_level(if verbose { tracing::Level::TRACE } else { tracing::Level::INFO })
		.init();

	if files.is_empty() {
		error!("no source files given\n{USAGE}");
		return ExitCode::FAILURE;
	}

	let mut sources = Vec::with_capacity(files.len());
	for file in &files {
		match fs::read_to_string(file) {
			Ok(source) => sources.push(source),
			Err(err) => {
				error!("unable to read '{file}': {err}");
				return ExitCode::FAILURE;
			}
		}
	}
	let sources: Vec<&str> = sources.iter().map(String::as_str).collect();

	let output = assemble(&sources, options);
	let object = &output.object;

	for segment in Segment::ALL {
		for (start, bytes) in object.runs(segment) {
			println!("{segment} ${start:06X} ({} bytes)", bytes.len());
			for (n, line) in bytes.chunks(16).enumerate() {
				let hex: Vec<String> = line.iter().map(|b| format!("{b:02X}")).collect();
				println!("  {:06X}: {}", start as usize + n * 16, hex.join(" "));
			}
		}
	}
	for reloc in object.relocations() {
		println!("reloc {reloc}");
	}
	let linkage = object.linkage();
	if let Some(group) = linkage.group {
		println!("link group {group}");
	}
	if let Some(page) = linkage.page {
		println!("link page ${page:02X}");
	}

	for err in &output.errors {
		eprintln!("{:?}", miette::Report::new(err.clone()));
	}
	if output.failed() {
		info!("{} error(s)", output.errors.len());
		return ExitCode::from(1);
	}
	ExitCode::SUCCESS
}
