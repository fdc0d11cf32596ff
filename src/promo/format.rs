/// The three observed promo CSV dialects, distinguished by which column
/// carries the promotion's item identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoFormat {
    /// One `promotionitems` cell per promotion holding all item codes as an
    /// embedded JSON / Python-literal document.
    ItemsAsDocument,
    /// One row per item; the `itemcode` column holds a single barcode and
    /// header fields repeat (or carry forward) across rows.
    ItemsAsRows,
    /// A `groups` cell holding item groups, each with a nested (possibly
    /// string-re-encoded) items document.
    ItemsAsGroups,
}

impl PromoFormat {
    /// Classify a file from its lower-cased, trimmed header set. Checked in
    /// priority order; `None` means the file is unrecognized and skipped.
    pub fn detect<S: AsRef<str>>(headers: &[S]) -> Option<Self> {
        let has = |name: &str| headers.iter().any(|h| h.as_ref() == name);
        if has("promotionitems") {
            Some(Self::ItemsAsDocument)
        } else if has("itemcode") {
            Some(Self::ItemsAsRows)
        } else if has("groups") {
            Some(Self::ItemsAsGroups)
        } else {
            None
        }
    }

    /// Shortest barcode this format generation accepts. The groups dialect is
    /// the newest and strictest; the source history disagrees, so a config
    /// override exists on top of these defaults.
    pub fn default_min_barcode_len(self) -> usize {
        match self {
            Self::ItemsAsDocument | Self::ItemsAsRows => 5,
            Self::ItemsAsGroups => 7,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ItemsAsDocument => "items-as-document",
            Self::ItemsAsRows => "items-as-rows",
            Self::ItemsAsGroups => "items-as-groups",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_document_format_first() {
        // A document-format file may also carry an itemcode column; the
        // document column wins.
        let headers = ["storeid", "promotionid", "promotionitems", "itemcode"];
        assert_eq!(
            PromoFormat::detect(&headers),
            Some(PromoFormat::ItemsAsDocument)
        );
    }

    #[test]
    fn detects_rows_format() {
        let headers = ["storeid", "promotionid", "itemcode", "discountedprice"];
        assert_eq!(PromoFormat::detect(&headers), Some(PromoFormat::ItemsAsRows));
    }

    #[test]
    fn detects_groups_format() {
        let headers = ["storeid", "promotionid", "groups"];
        assert_eq!(
            PromoFormat::detect(&headers),
            Some(PromoFormat::ItemsAsGroups)
        );
    }

    #[test]
    fn unknown_header_set_is_unrecognized() {
        let headers = ["storeid", "price", "quantity"];
        assert_eq!(PromoFormat::detect(&headers), None);
    }
}
