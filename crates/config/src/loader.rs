use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
};

use anyhow::bail;
use indoc::formatdoc;

use crate::Config;

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let config: Config = toml::from_str(&content)?;

    let warnings = validate(&config)?;

    for warning in warnings {
        log::warn!("{warning}");
    }

    Ok(config)
}

/// Validates the configuration. Errors are fatal, the returned strings are warnings.
pub(crate) fn validate(config: &Config) -> anyhow::Result<Vec<String>> {
    let mut warnings = Vec::new();

    validate_limits(config, &mut warnings)?;
    validate_persistence(config)?;
    validate_rules(config, &mut warnings)?;
    validate_service_prices(config)?;

    Ok(warnings)
}

fn validate_limits(config: &Config, warnings: &mut Vec<String>) -> anyhow::Result<()> {
    let limits = &config.limits;

    if limits.max_tokens == 0 {
        bail!("limits.max_tokens must be greater than zero");
    }

    if limits.initial_tokens > limits.max_tokens {
        warnings.push(format!(
            "limits.initial_tokens ({}) exceeds limits.max_tokens ({}), new buckets will start full",
            limits.initial_tokens, limits.max_tokens
        ));
    }

    if limits.refill_rate_per_second == 0 {
        warnings.push("limits.refill_rate_per_second is 0, buckets created on first access never refill".to_string());
    }

    Ok(())
}

fn validate_persistence(config: &Config) -> anyhow::Result<()> {
    let persistence = &config.persistence;

    if persistence.enabled && persistence.interval.is_zero() {
        bail!("persistence.interval must be greater than zero when persistence is enabled");
    }

    if persistence.enabled && persistence.directory.as_os_str().is_empty() {
        bail!("persistence.directory must not be empty when persistence is enabled");
    }

    Ok(())
}

fn validate_rules(config: &Config, warnings: &mut Vec<String>) -> anyhow::Result<()> {
    let mut ids = HashSet::new();
    let mut targets = HashSet::new();

    for rule in &config.rules {
        if rule.id.is_empty() {
            bail!(
                "Rule for service '{}' and client '{}' has an empty id",
                rule.service_id,
                rule.client_id
            );
        }

        if rule.max_tokens == 0 {
            bail!(formatdoc! {r#"
                Rule '{id}' has max_tokens = 0. Every rule must set max_tokens to a value greater than zero.

                Example:

                  [[rules]]
                  id = "{id}"
                  service_id = "{service}"
                  client_id = "{client}"
                  usage_price = 1
                  refill_rate_per_second = 1
                  max_tokens = 100
            "#, id = rule.id, service = rule.service_id, client = rule.client_id});
        }

        if !ids.insert(rule.id.as_str()) {
            bail!("Rule id '{}' is used more than once", rule.id);
        }

        let target = (
            rule.service_id.as_str(),
            rule.client_id.as_str(),
            rule.user_id.as_deref(),
        );

        if !targets.insert(target) {
            bail!(
                "Rule '{}' targets the same service, client and user as an earlier rule",
                rule.id
            );
        }

        if rule.initial_tokens() > rule.max_tokens {
            warnings.push(format!(
                "Rule '{}' sets initial_tokens ({}) above max_tokens ({}), the bucket will start full",
                rule.id,
                rule.initial_tokens(),
                rule.max_tokens
            ));
        }

        if rule.refill_rate_per_second == 0 {
            warnings.push(format!(
                "Rule '{}' has refill_rate_per_second = 0, its buckets never refill",
                rule.id
            ));
        }
    }

    Ok(())
}

fn validate_service_prices(config: &Config) -> anyhow::Result<()> {
    let mut prices: BTreeMap<&str, (u64, &str)> = config
        .services
        .iter()
        .map(|(id, service)| (id.as_str(), (service.usage_price, "services table")))
        .collect();

    for rule in &config.rules {
        match prices.get(rule.service_id.as_str()) {
            Some((price, origin)) if *price != rule.usage_price => {
                bail!(
                    "Rule '{}' prices service '{}' at {} tokens, but the {} prices it at {}",
                    rule.id,
                    rule.service_id,
                    rule.usage_price,
                    origin,
                    price
                );
            }
            Some(_) => (),
            None => {
                prices.insert(rule.service_id.as_str(), (rule.usage_price, "first rule"));
            }
        }
    }

    Ok(())
}
