// ProductInfo packet body
//
// An XML document describing the account's product attributes. The session
// parses it to validate the packet and then discards it.

use serde::Deserialize;

use crate::error::CoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProductInfo {
    #[serde(rename = "product", default)]
    pub products: Vec<Product>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Product {
    #[serde(rename = "type", default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub catalogue: Option<String>,
    #[serde(default)]
    pub head_files_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub autoplay: Option<String>,
}

impl ProductInfo {
    pub fn parse(payload: &[u8]) -> Result<Self, CoreError> {
        Ok(quick_xml::de::from_reader(payload)?)
    }
}
