use shibori::{render_string, ExecutionContext, RenderFlags};
use std::io::{self, Read};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let template = match args.next() {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("render: {path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => {
            let mut text = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut text) {
                eprintln!("render: reading stdin: {e}");
                return ExitCode::FAILURE;
            }
            text
        }
    };

    match render_string(&template, ExecutionContext::new(), RenderFlags::new()) {
        Ok(out) => match out.into_text() {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("render: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("render: {e}");
            ExitCode::FAILURE
        }
    }
}
