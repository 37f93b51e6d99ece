/// Static lookup from a two-letter marketplace code to the label shown in
/// the export dropdown. Unknown codes are reported by the caller and skipped
/// for marketplace-selection purposes only.
pub fn marketplace_label(code: &str) -> Option<&'static str> {
    let code = code.trim().to_uppercase();
    let label = match code.as_str() {
        "US" => "amazon.com",
        "CA" => "amazon.ca",
        "IN" => "amazon.in",
        "UK" => "amazon.co.uk",
        "DE" => "amazon.de",
        "FR" => "amazon.fr",
        "IT" => "amazon.it",
        "ES" => "amazon.es",
        "JP" => "amazon.co.jp",
        "AU" => "amazon.com.au",
        "SG" => "amazon.sg",
        "AE" => "amazon.ae",
        "SA" => "amazon.sa",
        "MX" => "amazon.com.mx",
        "BR" => "amazon.com.br",
        "NL" => "amazon.nl",
        "SE" => "amazon.se",
        "PL" => "amazon.pl",
        "TR" => "amazon.com.tr",
        _ => return None,
    };
    Some(label)
}
