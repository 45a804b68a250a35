//! Header derivation for pre-signed upload URLs.

/// SigV4 query-auth parameters. These authenticate the URL itself and must
/// not be repeated as headers.
const QUERY_AUTH_PARAMS: &[&str] = &[
    "x-amz-algorithm",
    "x-amz-credential",
    "x-amz-date",
    "x-amz-expires",
    "x-amz-signedheaders",
    "x-amz-signature",
    "x-amz-security-token",
];

const SIGNED_CONTENT_TYPE: &str = "application/octet-stream";

/// Headers a PUT to `upload_url` must carry for the signature to validate.
///
/// Every `x-amz-*` value embedded in the query string (other than the
/// query-auth parameters) is echoed back as a header. When the URL signs
/// `content-type`, the provider issued it for `application/octet-stream`
/// and that value wins over the file's own MIME type.
pub fn presigned_upload_headers(upload_url: &str, content_type: &str) -> Vec<(String, String)> {
    let query = upload_url
        .split_once('?')
        .map(|(_, q)| q.split('#').next().unwrap_or(""))
        .unwrap_or("");

    let mut headers = Vec::new();
    let mut signs_content_type = false;

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode(key);
        let value = decode(value);
        let lower = key.to_ascii_lowercase();

        if lower == "x-amz-signedheaders" {
            signs_content_type = value
                .split(';')
                .any(|h| h.eq_ignore_ascii_case("content-type"));
        }

        if lower.starts_with("x-amz-") && !QUERY_AUTH_PARAMS.contains(&lower.as_str()) {
            headers.push((lower, value));
        }
    }

    let content_type = if signs_content_type {
        SIGNED_CONTENT_TYPE
    } else {
        content_type
    };
    headers.insert(0, ("Content-Type".to_string(), content_type.to_string()));
    headers
}

fn decode(s: &str) -> String {
    let s = s.replace('+', " ");
    urlencoding::decode(&s)
        .map(|c| c.into_owned())
        .unwrap_or(s)
}
