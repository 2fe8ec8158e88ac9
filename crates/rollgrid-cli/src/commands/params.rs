use rollgrid_params::{KnownVariables, validate_with};

use super::{Context, ValidationFailed};

pub fn parse(ctx: &Context, text: &str) -> anyhow::Result<()> {
    let parsed = rollgrid_params::parse(text);
    ctx.emit(&parsed, |parsed| {
        println!("path: {}", parsed.path);
        for param in &parsed.parameters {
            match param.value() {
                Some(value) => println!("  {} = {value}", param.name()),
                None => println!("  {} (dynamic)", param.name()),
            }
        }
    })
}

pub fn validate(ctx: &Context, text: &str, strict: bool) -> anyhow::Result<()> {
    let parsed = rollgrid_params::parse(text);
    let known = KnownVariables::with_extra(ctx.config.known_variables());
    let strict = strict || ctx.config.strict_params();
    let report = validate_with(&parsed.parameters, strict, &known);

    ctx.emit(&report, |report| {
        if report.is_ok() {
            println!("✓ {} parameter(s) valid", parsed.parameters.len());
        }
        for message in report.messages() {
            println!("✗ {message}");
        }
    })?;

    if report.is_ok() {
        Ok(())
    } else {
        Err(ValidationFailed(report).into())
    }
}
