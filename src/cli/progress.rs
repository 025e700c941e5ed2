use std::collections::HashMap;
use std::time::{Duration, Instant};

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::pipeline::EngineEvent;
use crate::utils::formatting::format_duration;

/// Spinners for the current parameter and each value being extracted.
pub struct ScanProgress {
    multi: MultiProgress,
    status_bar: ProgressBar,
    value_bars: HashMap<String, ProgressBar>,
    fetched: usize,
    start_time: Instant,
}

impl ScanProgress {
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let status_bar = multi.add(ProgressBar::new_spinner());
        status_bar.set_style(spinner_style("  {spinner:.cyan} {msg}"));
        status_bar.set_message("Testing connection to the target URL");
        status_bar.enable_steady_tick(Duration::from_millis(120));

        Self {
            multi,
            status_bar,
            value_bars: HashMap::new(),
            fetched: 0,
            start_time: Instant::now(),
        }
    }

    pub fn handle_event(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::TargetProbed { is_dynamic, possible_backend } => {
                if *is_dynamic {
                    self.println(&format!("  {} target content is dynamic", style("!").yellow()));
                }
                if let Some(backend) = possible_backend {
                    self.println(&format!("  {} back-end DBMS could be '{}'", style("*").cyan(), backend));
                }
            }
            EngineEvent::ParameterTesting { point } => {
                self.status_bar.set_message(format!("testing {}", point.describe()));
            }
            EngineEvent::TechniqueTrying { parameter, technique } => {
                self.status_bar.set_message(format!("testing '{}' with {}", parameter, technique));
            }
            EngineEvent::VectorConfirmed { parameter, title, .. } => {
                self.println(&format!(
                    "  {} parameter '{}' appears to be '{}' injectable",
                    style("+").green(),
                    parameter,
                    title
                ));
            }
            EngineEvent::ParameterExhausted { parameter } => {
                self.println(&format!(
                    "  {} parameter '{}' does not seem to be injectable",
                    style("-").dim(),
                    parameter
                ));
            }
            EngineEvent::SessionResumed { parameter } => {
                self.println(&format!(
                    "  {} resumed injection point '{}' from the stored session",
                    style("*").cyan(),
                    parameter
                ));
            }
            EngineEvent::ExtractionStarted { key } => {
                let bar = self.multi.insert_before(&self.status_bar, ProgressBar::new_spinner());
                bar.set_style(spinner_style("    {spinner:.yellow} {msg}"));
                bar.set_message(format!("{}: resolving length", key));
                bar.enable_steady_tick(Duration::from_millis(100));
                self.value_bars.insert(key.clone(), bar);
            }
            EngineEvent::LengthResolved { key, length } => {
                if let Some(bar) = self.value_bars.get(key) {
                    bar.set_message(format!("{}: {} characters", key, length));
                }
            }
            EngineEvent::CharacterResolved { key, partial, .. } => {
                if let Some(bar) = self.value_bars.get(key) {
                    bar.set_message(format!("{}: {}", key, partial));
                }
            }
            EngineEvent::ValueFetched { key, .. } => {
                self.fetched += 1;
                if let Some(bar) = self.value_bars.remove(key) {
                    bar.finish_and_clear();
                }
                self.update_status();
            }
            EngineEvent::ExtractionFailed { key, partial } => {
                if let Some(bar) = self.value_bars.remove(key) {
                    bar.abandon_with_message(format!("{}: partial '{}'", key, partial));
                }
            }
        }
    }

    fn update_status(&self) {
        self.status_bar.set_message(format!(
            "{} | {} values fetched",
            format_duration(self.start_time.elapsed().as_millis() as u64),
            self.fetched
        ));
    }

    /// Print a line above the bars.
    pub fn println(&self, msg: &str) {
        let _ = self.multi.println(msg);
    }

    pub fn finish(self) {
        for (_, bar) in self.value_bars {
            bar.finish_and_clear();
        }
        self.status_bar.finish_and_clear();
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn spinner_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
