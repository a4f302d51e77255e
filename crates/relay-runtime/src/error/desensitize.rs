use url::{Host, Url};

const MASK: &str = "***";

/// Mask the host of a custom endpoint so it can appear in error payloads
///
/// The first and last host labels survive, everything in between collapses
/// into `***` (`https://api.abc.com/v1` becomes `https://api.***.com/v1`).
/// Credentials embedded in the URL are dropped.
pub fn desensitize_url(raw: &str) -> String {
    let Ok(url) = Url::parse(raw) else {
        return MASK.to_owned();
    };

    let host = match url.host() {
        Some(Host::Domain(domain)) => mask_labels(domain),
        Some(Host::Ipv4(ip)) => mask_labels(&ip.to_string()),
        Some(Host::Ipv6(_)) => format!("[{MASK}]"),
        None => return MASK.to_owned(),
    };

    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = match url.path() {
        "/" if !raw.ends_with('/') => "",
        path => path,
    };
    let query = url.query().map(|q| format!("?{q}")).unwrap_or_default();

    format!("{}://{host}{port}{path}{query}", url.scheme())
}

fn mask_labels(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    match labels.as_slice() {
        [first, .., last] if labels.len() > 2 => format!("{first}.{MASK}.{last}"),
        [_, last] => format!("{MASK}.{last}"),
        _ => MASK.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_middle_labels() {
        assert_eq!(desensitize_url("https://api.abc.com/v1"), "https://api.***.com/v1");
    }

    #[test]
    fn collapses_deep_subdomains() {
        assert_eq!(
            desensitize_url("https://gateway.eu.internal.example.com/openai/v1"),
            "https://gateway.***.com/openai/v1"
        );
    }

    #[test]
    fn masks_second_level_domain() {
        assert_eq!(desensitize_url("https://example.com/v1"), "https://***.com/v1");
    }

    #[test]
    fn keeps_port_and_query() {
        assert_eq!(
            desensitize_url("http://llm.corp.local:8443/v1?tenant=a"),
            "http://llm.***.local:8443/v1?tenant=a"
        );
    }

    #[test]
    fn masks_ip_addresses() {
        assert_eq!(desensitize_url("http://10.0.12.4:11434/v1"), "http://10.***.4:11434/v1");
    }

    #[test]
    fn single_label_host() {
        assert_eq!(desensitize_url("http://localhost:1234/v1"), "http://***:1234/v1");
    }

    #[test]
    fn drops_credentials() {
        assert_eq!(desensitize_url("https://user:pw@api.abc.com/v1"), "https://api.***.com/v1");
    }

    #[test]
    fn bare_host_without_trailing_slash() {
        assert_eq!(desensitize_url("https://api.abc.com"), "https://api.***.com");
    }

    #[test]
    fn unparsable_input_is_fully_masked() {
        assert_eq!(desensitize_url("not a url"), "***");
    }
}
