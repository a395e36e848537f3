//! Rebuild the current invocation as a daemon command line.

use std::fmt::Write as _;

use transloadify_core::{TemplateSource, WatchOptions};

/// Command line that reproduces `options` in watch mode.
///
/// Values are wrapped in backslash-escaped quotes because the result is
/// embedded in a double-quoted `bash -c` string. `--watch` is always
/// appended.
pub fn reconstruct_command(program: &str, options: &WatchOptions) -> String {
    let mut cmd = program.to_string();

    push_arg(&mut cmd, "input", &options.input.display().to_string());
    push_arg(&mut cmd, "output", &options.output.display().to_string());
    match &options.template {
        TemplateSource::TemplateId(id) => push_arg(&mut cmd, "template", id),
        TemplateSource::Steps { path, .. } => {
            push_arg(&mut cmd, "template-file", &path.display().to_string())
        }
    }
    if !options.preserve {
        cmd.push_str(" --preserve=false");
    }
    if options.recursive {
        cmd.push_str(" --recursive");
    }
    if options.skip_stale {
        cmd.push_str(" --skip-stale");
    }
    if let Some(url) = &options.notify_url {
        push_arg(&mut cmd, "notify-url", url);
    }
    for (name, value) in &options.fields {
        push_arg(&mut cmd, "field", &format!("{name}={value}"));
    }
    cmd.push_str(" --watch");
    cmd
}

fn push_arg(cmd: &mut String, flag: &str, value: &str) {
    let _ = write!(cmd, " --{flag} \\\"{}\\\"", escape(value));
}

// Two quoting levels: the outer `bash -c "..."` and the inner `\"...\"`.
// Each special character needs escaping for both.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str(r"\\\\"),
            '"' | '$' | '`' => {
                out.push_str(r"\\\");
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}
