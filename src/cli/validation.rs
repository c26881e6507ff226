use crate::backend::LookupKind;
use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(raw) = args.contact.as_deref() {
        crate::utils::validate_contact_number(raw)
            .map_err(|e| format!("invalid --contact: {e}"))?;
    }
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err("invalid --timeout, expected positive seconds".to_string());
        }
    }
    if let Some(kind) = args.list.as_deref() {
        if LookupKind::parse(kind).is_none() {
            return Err(format!(
                "invalid --list '{kind}', expected agents, queues, campaigns, or dispositions"
            ));
        }
        // Lookups are keyed by unix seconds, so here the range must parse.
        let start = args.start.as_deref().unwrap_or_default();
        let end = args.end.as_deref().unwrap_or_default();
        crate::utils::parse_local_timestamp(start)
            .map_err(|e| format!("--list requires a parseable --start: {e}"))?;
        crate::utils::parse_local_timestamp(end)
            .map_err(|e| format!("--list requires a parseable --end: {e}"))?;
    }
    Ok(())
}
