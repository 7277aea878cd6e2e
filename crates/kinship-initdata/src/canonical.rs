/// Build the data-check-string: `key=value` lines sorted by key, joined with `\n`.
///
/// Values must be passed exactly as received (percent-encoded). The caller is responsible for
/// leaving out the `hash` parameter. Keys compare by bytes, which for UTF-8 is code-point order.
pub fn data_check_string<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs: Vec<(&str, &str)> = pairs.into_iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::new();
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out
}
