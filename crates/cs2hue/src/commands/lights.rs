//! `cs2hue lights`: list what the bridge knows about.

use serde::Serialize;
use tabled::Tabled;

use cs2hue_api::HueLight;

use super::Loaded;
use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct LightEntry {
    id: String,
    managed: bool,
    #[serde(flatten)]
    light: HueLight,
}

#[derive(Tabled)]
struct LightRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Bri")]
    bri: String,
    #[tabled(rename = "Reachable")]
    reachable: String,
    #[tabled(rename = "Managed")]
    managed: String,
}

fn to_row(entry: &LightEntry, color: bool) -> LightRow {
    let state = &entry.light.state;
    LightRow {
        id: entry.id.clone(),
        name: entry.light.name.clone(),
        kind: entry.light.kind.clone(),
        power: if entry.light.is_streaming() {
            "streaming".into()
        } else {
            output::power(state.on, color)
        },
        bri: state.bri.map_or_else(|| "-".into(), |b| b.to_string()),
        reachable: match state.reachable {
            Some(true) => "yes".into(),
            Some(false) => "no".into(),
            None => "-".into(),
        },
        managed: if entry.managed { "*".into() } else { String::new() },
    }
}

pub async fn handle(ctx: &Loaded, global: &GlobalOpts) -> Result<(), CliError> {
    let client = ctx.hue_client()?;
    let managed = ctx.config.light_ids();
    let lights = client.list_lights().await?;

    let entries: Vec<LightEntry> = lights
        .into_iter()
        .map(|(id, light)| LightEntry {
            managed: managed.iter().any(|m| m.as_str() == id),
            id,
            light,
        })
        .collect();

    let color = output::should_color(global.color);
    let out = output::render_list(global.output, &entries, |e| to_row(e, color))?;
    output::print_output(&out);
    Ok(())
}
