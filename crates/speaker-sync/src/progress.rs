use indicatif::{ProgressBar, ProgressStyle};

pub fn frame_bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} {bar:40.cyan/blue} {percent:>3.bold}% {pos:>5}/{len:<5} frames [{elapsed_precise:.dim}<{eta_precise:.dim}] {msg:.yellow}",
    )
    .expect("invalid frame bar template")
    .progress_chars("█▉▊▋▌▍▎▏ ")
}

pub fn batch_bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} {bar:40.green/blue} {pos:>4}/{len:<4} batches [{elapsed_precise:.dim}<{eta_precise:.dim}] {msg:.yellow}",
    )
    .expect("invalid batch bar template")
    .progress_chars("█▉▊▋▌▍▎▏ ")
}

pub fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} {spinner:.cyan.bold} [{elapsed_precise:.dim}] {pos:>5}f {msg:.yellow}",
    )
    .expect("invalid spinner template")
    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
}

/// Creates a bar for `total` items, or a spinner when the total is unknown.
/// `hidden` suppresses drawing entirely, which keeps test output clean.
pub fn stage_bar(
    label: &'static str,
    total: Option<u64>,
    style: ProgressStyle,
    hidden: bool,
) -> ProgressBar {
    let bar = match total {
        _ if hidden => ProgressBar::hidden(),
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(style);
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(spinner_style());
            bar
        }
    };
    bar.set_prefix(label);
    bar
}
