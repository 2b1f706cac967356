//! Console writer implementation

use crate::core::{log_event, ColorTheme, LogConfig, LogEvent, LogLevel, Writer};
use colored::{Color, ColoredString, Colorize};

/// Module styles, picked by hashing the module name
const MODULE_STYLES: [(Color, bool); 16] = [
    (Color::BrightGreen, true),
    (Color::BrightGreen, false),
    (Color::Green, false),
    (Color::Yellow, true),
    (Color::BrightYellow, false),
    (Color::Yellow, false),
    (Color::BrightBlue, true),
    (Color::BrightBlue, false),
    (Color::Blue, false),
    (Color::BrightMagenta, true),
    (Color::BrightMagenta, false),
    (Color::Magenta, false),
    (Color::BrightCyan, true),
    (Color::BrightCyan, false),
    (Color::Cyan, false),
    (Color::White, true),
];

fn style(text: &str) -> ColoredString {
    let mut crc = flate2::Crc::new();
    crc.update(text.as_bytes());
    let (color, faint) = MODULE_STYLES[crc.sum() as usize % MODULE_STYLES.len()];
    let styled = text.color(color);
    if faint {
        styled.dimmed()
    } else {
        styled
    }
}

/// Long hashed names (as produced by `cargo run`) are cut to 8 characters
fn short_process_name(name: &str) -> &str {
    if name.chars().count() <= 16 || !name.contains('-') {
        return name;
    }
    match name.char_indices().nth(8) {
        Some((end, _)) => &name[..end],
        None => name,
    }
}

/// Pass-through writer that prints every event to stdout
pub struct ConsoleWriter {
    process: String,
}

impl ConsoleWriter {
    pub fn new() -> Self {
        let process = log_event::process_name().unwrap_or_else(|| "-".to_string());
        Self {
            process: style(short_process_name(&process)).to_string(),
        }
    }

    /// Apply `LOGMANAGER_COLORED_OUTPUT` from a configuration
    pub fn apply_config(config: &LogConfig) {
        match config.colored_output {
            Some(enabled) => colored::control::set_override(enabled),
            None => colored::control::unset_override(),
        }
    }
}

impl Default for ConsoleWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer for ConsoleWriter {
    fn build_theme(&self, module: &str) -> ColorTheme {
        ColorTheme {
            module: style(module).to_string(),
            levels: LogLevel::ALL
                .iter()
                .map(|level| {
                    let name = format!("{:5}", level.to_str());
                    match level {
                        LogLevel::Critical => name.on_red().to_string(),
                        _ => name.color(level.color_code()).to_string(),
                    }
                })
                .collect(),
        }
    }

    fn log(&self, event: &LogEvent, theme: &ColorTheme) {
        println!(
            "[{}] {} {}@{} {}:{} {}",
            event.timestamp.format("%H:%M:%S%.3f"),
            theme.level(event.level),
            self.process,
            theme.module(&event.module),
            event.file,
            event.line,
            event.message
        );
    }
}
