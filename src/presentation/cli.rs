//! A coloured terminal summary of one `ApiResult`, printed with the same
//! `tabled`/`colored` combination used elsewhere for tabular CLI output.

use colored::*;
use tabled::settings::{object::Columns, Alignment, Modify, Style};
use tabled::{Table, Tabled};

use crate::{ApiResult, Message, MessageClass};

#[derive(Tabled)]
struct MessageRow {
    class: String,
    text: String,
}

/// Print a coloured summary of `result` to stdout. Returns `true` when the
/// request succeeded, so the caller can pick an exit code.
pub fn print_result_summary(result: &ApiResult<'_>) -> bool {
    println!();
    if result.success {
        println!("{} {}", "OINO".bold().cyan(), format!("{} {}", result.status_code, result.status_message).green());
    } else {
        println!("{} {}", "OINO".bold().cyan(), format!("{} {}", result.status_code, result.status_message).red());
    }

    if !result.messages.is_empty() {
        let rows: Vec<MessageRow> = result.messages.iter().map(message_row).collect();
        let table = Table::new(rows).with(Style::rounded()).with(Modify::new(Columns::new(0..=0)).with(Alignment::left())).to_string();
        println!("{table}");
    }
    println!();
    result.success
}

fn message_row(message: &Message) -> MessageRow {
    let colored_class = match message.class {
        MessageClass::Error => "ERROR".red().to_string(),
        MessageClass::Warning => "WARNING".yellow().to_string(),
        MessageClass::Info => "INFO".cyan().to_string(),
        MessageClass::Debug => "DEBUG".dimmed().to_string(),
    };
    MessageRow { class: colored_class, text: message.text.clone() }
}
