use crate::output::{print_json, Table};
use crate::settings::Settings;
use frk_core::paths;
use frk_core::script;
use frk_core::types::Channel;

pub fn run(settings: &Settings, channel: Option<Channel>, json: bool) -> anyhow::Result<()> {
    let channel = settings.channel(channel);
    let entry = paths::cache_entry(&settings.data_root(), channel);
    if !entry.is_dir() {
        anyhow::bail!(
            "no cached {channel} release; run `frk cache refresh --channel {channel}` first"
        );
    }

    let scripts = script::discover(&entry)?;
    if json {
        return print_json(&scripts);
    }

    let mut table = Table::new(&["SCRIPT", "SQL SERVER", "PATH"]);
    for s in &scripts {
        let relative = s.path.strip_prefix(&entry).unwrap_or(&s.path);
        let gate = s
            .min_major_version
            .map(|v| format!(">= {v}"))
            .unwrap_or_else(|| "any".to_string());
        table.row(vec![s.name.clone(), gate, relative.display().to_string()]);
    }
    table.print();
    Ok(())
}
