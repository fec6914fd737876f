//! Console rendering of build progress

use super::context::UiContext;
use super::output;
use crate::build::{BuildReporter, Step};

/// `BuildReporter` printing one status line per event
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    ctx: UiContext,
    show_values: bool,
}

impl ConsoleReporter {
    pub fn new(ctx: UiContext) -> Self {
        Self {
            ctx,
            show_values: false,
        }
    }

    /// Print computed variable values, not only their names
    pub fn with_values(mut self, show: bool) -> Self {
        self.show_values = show;
        self
    }
}

impl BuildReporter for ConsoleReporter {
    fn images_pulling(&self, images: &[String], forced: bool) {
        if forced {
            output::section(&self.ctx, "Force pull images");
        } else {
            output::section(&self.ctx, &format!("Absent images: {}", images.join(" ")));
        }
    }

    fn var_started(&self, name: &str) {
        output::step_info(&self.ctx, &format!("Calculating {} var", name));
    }

    fn var_computed(&self, name: &str, value: &str) {
        if self.show_values {
            output::step_ok_detail(&self.ctx, name, value);
        } else {
            output::step_ok(&self.ctx, name);
        }
    }

    fn step_started(&self, step: &Step) {
        match &step.output {
            Some(local) => output::section(
                &self.ctx,
                &format!("Building {} (output to {})", step.name, local),
            ),
            None => output::section(&self.ctx, &format!("Building {}", step.name)),
        }
    }

    fn step_finished(&self, step: &Step) {
        output::step_ok(&self.ctx, &format!("{} built", step.name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_without_panicking() {
        let reporter = ConsoleReporter::new(UiContext::non_interactive()).with_values(true);
        let step = Step {
            name: "app".to_string(),
            target: "app-out".to_string(),
            output: Some("./bin".to_string()),
        };
        reporter.images_pulling(&["alpine".to_string()], false);
        reporter.images_pulling(&["alpine".to_string()], true);
        reporter.var_started("VERSION");
        reporter.var_computed("VERSION", "v1.0.0");
        reporter.step_started(&step);
        reporter.step_finished(&step);
    }
}
