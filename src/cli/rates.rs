use super::ui;
use crate::core::{CurrencyPair, Provider, Rate};
use crate::service::RateService;
use anyhow::{Context, Result};
use comfy_table::Cell;

/// Renders rates for one pair, lowest first, with each provider's sign-up link.
pub fn rates_table(pair: &CurrencyPair, rates: &[Rate], providers: &[Provider]) -> String {
    let mut output = format!(
        "Rates for {}\n\n",
        ui::style_text(&pair.to_string(), ui::StyleType::Title)
    );

    if rates.is_empty() {
        output.push_str(&ui::style_text(
            "No rates stored for this pair yet",
            ui::StyleType::Subtle,
        ));
        return output;
    }

    let best = rates.iter().map(|r| r.rate).fold(f64::MIN, f64::max);

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Provider"),
        ui::header_cell("Rate"),
        ui::header_cell("Last Updated (UTC)"),
        ui::header_cell("Register"),
    ]);

    for rate in rates {
        let link = providers
            .iter()
            .find(|p| p.name == rate.provider)
            .map_or("N/A", |p| p.registration_link.as_str());
        table.add_row(vec![
            Cell::new(&rate.provider),
            ui::rate_cell(rate.rate, rate.rate == best),
            Cell::new(rate.last_updated.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(link),
        ]);
    }

    output.push_str(&table.to_string());
    output
}

pub fn providers_table(providers: &[Provider]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Provider"), ui::header_cell("Register")]);
    for provider in providers {
        table.add_row(vec![
            Cell::new(&provider.name),
            Cell::new(&provider.registration_link),
        ]);
    }
    table.to_string()
}

pub async fn show_rates(service: &RateService, pair: &str) -> Result<()> {
    let pair: CurrencyPair = pair
        .parse()
        .with_context(|| format!("Invalid currency pair: {pair}"))?;
    if !service.list_supported_currency_pairs().contains(&pair) {
        anyhow::bail!("Currency pair {pair} is not supported");
    }

    let rates = service.rates_for_pair(&pair).await?;
    let providers = service.list_providers().await?;
    println!("{}", rates_table(&pair, &rates, &providers));
    Ok(())
}

pub fn show_pairs(service: &RateService) {
    for pair in service.list_supported_currency_pairs() {
        println!("{pair}");
    }
}

pub async fn show_providers(service: &RateService) -> Result<()> {
    let providers = service.list_providers().await?;
    println!("{}", providers_table(&providers));
    Ok(())
}
