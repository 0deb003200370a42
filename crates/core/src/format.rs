//! Display formatting for report consumers. Formatting never changes the
//! underlying numbers, only how they are printed.

/// `12345.5` with 2 decimals and code `SAR` -> `SAR 12,345.50`.
pub fn format_currency(amount: f64, decimals: u32, currency: &str) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let body = group_thousands(&format!("{:.*}", decimals as usize, amount.abs()));
    if currency.is_empty() {
        format!("{sign}{body}")
    } else {
        format!("{currency} {sign}{body}")
    }
}

/// Formats a value that is already expressed in percent.
pub fn format_percentage(percent: f64, decimals: u32) -> String {
    format!("{:.*}%", decimals as usize, percent)
}

/// Whole counts with thousands separators.
pub fn format_count(value: u64) -> String {
    group_thousands(&value.to_string())
}

fn group_thousands(digits: &str) -> String {
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    match frac_part {
        Some(f) => format!("{grouped}.{f}"),
        None => grouped,
    }
}
