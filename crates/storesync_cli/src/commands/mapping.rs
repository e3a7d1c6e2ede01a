//! Mapping command implementation.

use serde::Serialize;
use std::path::Path;
use storesync_core::{Authority, Direction, EntityKind};
use storesync_engine::StoresyncConfig;

/// One mapped field as the engine will apply it.
#[derive(Debug, Serialize)]
pub struct FieldRow {
    /// Source field.
    pub from: String,
    /// Target field.
    pub to: String,
    /// Conversion applied.
    pub transform: &'static str,
    /// Whether the source must carry the field.
    pub required: bool,
    /// Which side wins when both changed the field.
    pub authority: Authority,
}

/// Effective mapping of one kind on one server.
#[derive(Debug, Serialize)]
pub struct MappingResult {
    /// Server name.
    pub server: String,
    /// Entity kind.
    pub kind: EntityKind,
    /// Mapping direction.
    pub direction: Direction,
    /// Mapped fields in rule order.
    pub fields: Vec<FieldRow>,
}

/// Resolves the mapping of `kind` on `server`.
pub fn resolve(
    config: &StoresyncConfig,
    server: &str,
    kind: &str,
    inbound: bool,
) -> Result<MappingResult, Box<dyn std::error::Error>> {
    let server = config.server(server)?;
    let kind: EntityKind = kind.parse()?;
    let direction = if inbound {
        Direction::RemoteToLocal
    } else {
        Direction::LocalToRemote
    };
    let mapping = server.field_mapper()?.resolve(kind, direction);
    let authority = server.authority_table();

    let fields = mapping
        .rules()
        .iter()
        .map(|rule| {
            let (from, to, transform) = if inbound {
                (&rule.remote, &rule.local, rule.transform.inverse())
            } else {
                (&rule.local, &rule.remote, rule.transform)
            };
            FieldRow {
                from: from.clone(),
                to: to.clone(),
                transform: transform.name(),
                required: rule.required,
                authority: authority.authority_for(kind, &rule.local),
            }
        })
        .collect();

    Ok(MappingResult {
        server: server.server_name(),
        kind,
        direction,
        fields,
    })
}

/// Runs the mapping command.
pub fn run(
    path: &Path,
    server: &str,
    kind: &str,
    inbound: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = StoresyncConfig::load(path)?;
    let result = resolve(&config, server, kind, inbound)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &MappingResult) {
    println!("{} mapping on {} ({:?})", result.kind, result.server, result.direction);
    for row in &result.fields {
        let required = if row.required { " required" } else { "" };
        println!(
            "  {:<28} -> {:<24} {:<18} {:?}{required}",
            row.from, row.to, row.transform, row.authority
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StoresyncConfig {
        StoresyncConfig::from_json_str(
            r#"{"servers": [{
                "url": "https://shop.example.com",
                "item_field_map": [{"local": "item_group", "remote": "categories"}],
                "authority": [{"kind": "Item", "field": "description", "authority": "local"}]
            }]}"#,
        )
        .unwrap()
    }

    #[test]
    fn outbound_item_mapping_includes_overrides() {
        let result = resolve(&config(), "shop.example.com", "item", false).unwrap();
        assert_eq!(result.fields[0].from, "item_name");
        assert_eq!(result.fields[0].to, "name");
        assert!(result.fields[0].required);
        assert!(result.fields.iter().any(|f| f.from == "item_group"));

        let description = result
            .fields
            .iter()
            .find(|f| f.from == "description")
            .unwrap();
        assert_eq!(description.authority, Authority::Local);
    }

    #[test]
    fn inbound_price_mapping_parses_numbers() {
        let result = resolve(&config(), "shop.example.com", "Price", true).unwrap();
        assert_eq!(result.fields[0].from, "regular_price");
        assert_eq!(result.fields[0].transform, "string_to_number");
        assert_eq!(result.fields[0].authority, Authority::Local);
    }

    #[test]
    fn unknown_kind_or_server_fails() {
        assert!(resolve(&config(), "shop.example.com", "Invoice", false).is_err());
        assert!(resolve(&config(), "other.example.com", "Item", false).is_err());
    }
}
