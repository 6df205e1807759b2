use indicatif::{ProgressStyle, style::TemplateError};

pub(crate) fn get_style_pipeline() -> Result<ProgressStyle, TemplateError> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("=>-"))
}

pub(crate) fn get_style_task() -> Result<ProgressStyle, TemplateError> {
    Ok(ProgressStyle::default_spinner()
        .template("  {spinner:.blue} {msg} [{elapsed}]")?
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "))
}
