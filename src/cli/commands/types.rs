//! `metasync types` command - list registered entity types

use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::registry;

pub fn run() -> Result<()> {
    let registry = registry::builtin().into_diagnostic()?;
    let requested: Vec<&str> = registry.names().collect();
    let order = registry.dependency_order(&requested).into_diagnostic()?;

    let mut builder = Builder::default();
    builder.push_record(["Type", "Key field", "Id field", "Depends on"]);
    for name in &order {
        let descriptor = registry.get(name).into_diagnostic()?;
        builder.push_record(vec![
            descriptor.name.clone(),
            descriptor.key_field.clone(),
            descriptor.id_field.clone(),
            descriptor.depends_on.join(", "),
        ]);
    }
    println!("{}", builder.build().with(Style::markdown()));
    println!("\nTypes are listed in cache/deploy dependency order.");
    Ok(())
}
