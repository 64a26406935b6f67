//! Header normalization and the canonical column vocabulary.
//!
//! Uploaded files arrive with padded or inconsistently spelled headers
//! (`" Sales "`, `"Units_Sold"`, `"Discount band"`). Every header is trimmed
//! first and then looked up in the [`AliasMap`]; headers without an alias
//! pass through unchanged so extra columns survive the pipeline.
//!
//! The built-in map can be extended from a YAML file:
//!
//! ```yaml
//! aliases:
//!   Revenue: Sales
//!   Cost of Sales: COGS
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::Read,
    path::Path,
};

use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::record::RecordTable;

pub const PRODUCT: &str = "Product";
pub const DISCOUNT_BAND: &str = "Discount Band";
pub const UNITS_SOLD: &str = "Units Sold";
pub const MANUFACTURING_PRICE: &str = "Manufacturing Price";
pub const SALE_PRICE: &str = "Sale Price";
pub const GROSS_SALES: &str = "Gross Sales";
pub const DISCOUNTS: &str = "Discounts";
pub const SALES: &str = "Sales";
pub const COGS: &str = "COGS";
pub const PROFIT: &str = "Profit";
pub const MONTH_NAME: &str = "Month Name";
pub const DATE: &str = "Date";
pub const SEGMENT: &str = "Segment";
pub const COUNTRY: &str = "Country";
pub const YEAR: &str = "Year";

pub const CANONICAL_COLUMNS: &[&str] = &[
    PRODUCT,
    DISCOUNT_BAND,
    UNITS_SOLD,
    MANUFACTURING_PRICE,
    SALE_PRICE,
    GROSS_SALES,
    DISCOUNTS,
    SALES,
    COGS,
    PROFIT,
    MONTH_NAME,
    DATE,
    SEGMENT,
    COUNTRY,
    YEAR,
];

const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("product", PRODUCT),
    ("Product Name", PRODUCT),
    ("Discount band", DISCOUNT_BAND),
    ("Discount_Band", DISCOUNT_BAND),
    ("DiscountBand", DISCOUNT_BAND),
    ("Units sold", UNITS_SOLD),
    ("Units_Sold", UNITS_SOLD),
    ("UnitsSold", UNITS_SOLD),
    ("Manufacturing price", MANUFACTURING_PRICE),
    ("Manufacturing_Price", MANUFACTURING_PRICE),
    ("Manufacturing  Price", MANUFACTURING_PRICE),
    ("Sale price", SALE_PRICE),
    ("Sale_Price", SALE_PRICE),
    ("Sales Price", SALE_PRICE),
    ("Gross sales", GROSS_SALES),
    ("Gross_Sales", GROSS_SALES),
    ("GrossSales", GROSS_SALES),
    ("Discount", DISCOUNTS),
    ("discounts", DISCOUNTS),
    ("sales", SALES),
    ("Net Revenue", SALES),
    ("Cogs", COGS),
    ("cogs", COGS),
    ("Cost of Goods Sold", COGS),
    ("profit", PROFIT),
    ("Profits", PROFIT),
    ("Month name", MONTH_NAME),
    ("Month_Name", MONTH_NAME),
    ("MonthName", MONTH_NAME),
    ("date", DATE),
    ("Order Date", DATE),
    ("segment", SEGMENT),
    ("country", COUNTRY),
    ("year", YEAR),
];

pub fn is_canonical(name: &str) -> bool {
    CANONICAL_COLUMNS.contains(&name)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AliasFile {
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct AliasMap {
    entries: HashMap<String, String>,
}

impl Default for AliasMap {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AliasMap {
    pub fn builtin() -> Self {
        let entries = BUILTIN_ALIASES
            .iter()
            .map(|(raw, canonical)| (raw.trim().to_string(), canonical.to_string()))
            .collect();
        Self { entries }
    }

    /// Registers `raw` as another spelling of `canonical`.
    pub fn insert(&mut self, raw: &str, canonical: &str) -> Result<()> {
        let raw = raw.trim();
        let canonical = canonical.trim();
        if raw.is_empty() {
            bail!("Alias for '{canonical}' cannot be empty");
        }
        if !is_canonical(canonical) {
            bail!(
                "Alias target '{canonical}' is not a recognised column (expected one of: {})",
                CANONICAL_COLUMNS.join(", ")
            );
        }
        self.entries.insert(raw.to_string(), canonical.to_string());
        Ok(())
    }

    /// Loads extra aliases from YAML and merges them over the built-in map.
    pub fn load(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).with_context(|| format!("Opening alias file {path:?}"))?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .with_context(|| format!("Reading alias file {path:?}"))?;
        let parsed: AliasFile =
            serde_yaml::from_str(&raw).with_context(|| format!("Parsing alias file {path:?}"))?;
        let mut map = Self::builtin();
        for (alias, canonical) in &parsed.aliases {
            map.insert(alias, canonical)
                .with_context(|| format!("Alias '{alias}' in {path:?}"))?;
        }
        Ok(map)
    }

    /// Resolves a header after trimming; unknown headers come back trimmed.
    pub fn resolve<'a>(&'a self, header: &'a str) -> &'a str {
        let trimmed = header.trim();
        self.entries
            .get(trimmed)
            .map(String::as_str)
            .unwrap_or(trimmed)
    }
}

pub fn normalize_headers(headers: &[String], aliases: &AliasMap) -> Vec<String> {
    headers
        .iter()
        .map(|header| aliases.resolve(header).to_string())
        .collect()
}

pub fn normalize_table(mut table: RecordTable, aliases: &AliasMap) -> RecordTable {
    let normalized = normalize_headers(table.headers(), aliases);
    let changed = table
        .headers()
        .iter()
        .zip(&normalized)
        .filter(|(before, after)| before != after)
        .count();
    debug!("Normalized {changed} header(s)");
    table.rename_headers(normalized);
    table
}
