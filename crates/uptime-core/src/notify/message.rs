use std::fmt::Write;

use chrono::SecondsFormat;

use crate::monitor::state::{Direction, Transition};

pub fn compose_subject(transition: &Transition, display_name: &str) -> String {
    format!("[{}] {} {}", display_name, transition.endpoint, transition.direction)
}

/// Plain-text body: endpoint, new status, timestamp, and failure details for outages.
pub fn compose_body(transition: &Transition, display_name: &str) -> String {
    let at = transition.at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut body = format!("Hello {},\n\n", display_name);

    match transition.direction {
        Direction::WentDown => {
            let _ = writeln!(body, "{} went down at {}.", transition.endpoint, at);
        }
        Direction::Recovered => {
            let _ = writeln!(body, "{} recovered at {} and is reachable again.", transition.endpoint, at);
        }
    }

    body.push('\n');
    let _ = writeln!(body, "Status:   {}", transition.to.to_string().to_uppercase());
    let _ = writeln!(body, "Attempts: {}", transition.attempts);
    if let Some(code) = transition.status_code {
        let _ = writeln!(body, "HTTP:     {}", code);
    }
    if transition.direction == Direction::WentDown {
        if let Some(ref reason) = transition.reason {
            let _ = writeln!(body, "Reason:   {}", reason);
        }
    }

    body.push_str("\n-- \nuptime-monitor\n");
    body
}
