use std::path::PathBuf;

use url::Url;

/// Raw-content host of GitHub.
pub const GITHUB_RAW_HOST: &str = "raw.githubusercontent.com";
pub const GITHUB_HOST: &str = "github.com";

/// The .NET library license page, shared by many Microsoft packages.
pub const DOTNET_LICENSE_HOST: &str = "dotnet.microsoft.com";
pub const DOTNET_LICENSE_PATH: &str = "/en-us/dotnet_library_license.htm";
pub const DOTNET_LICENSE_FILE: &str = "dotnet_library_license.txt";

pub const OPENSOURCE_HOST: &str = "opensource.org";
/// Container of the license body on opensource.org license pages.
pub const OPENSOURCE_SELECTOR: &str = "div#LicenseText";

/// How a license URL has to be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseSource {
    /// Plain file; the body is the license text.
    File(Url),
    /// HTML page; the license is the text of one element.
    HtmlElement { url: Url, selector: &'static str },
    /// HTML page; the license is the whole body flattened to text.
    HtmlFlatten(Url),
    Unrecognized,
}

/// Where the fetched text goes. Classification may move it to a shared
/// location so every package pointing at the same page shares one file.
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub dest: PathBuf,
    license_root: PathBuf,
}

impl FetchContext {
    pub fn new(dest: impl Into<PathBuf>, license_root: impl Into<PathBuf>) -> Self {
        FetchContext {
            dest: dest.into(),
            license_root: license_root.into(),
        }
    }
}

/// Lower-cased host with a leading `www.` removed.
fn host_of(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    })
}

/// Decide how `url` is fetched. Rules are checked in order; the first hit wins.
pub fn classify(url: &Url, ctx: &mut FetchContext) -> LicenseSource {
    let Some(host) = host_of(url) else {
        return LicenseSource::Unrecognized;
    };

    if host == GITHUB_RAW_HOST {
        return LicenseSource::File(url.clone());
    }

    if host == GITHUB_HOST && url.path().contains("/blob/") {
        return match github_raw_url(url) {
            Some(raw) => LicenseSource::File(raw),
            None => LicenseSource::Unrecognized,
        };
    }

    if host == DOTNET_LICENSE_HOST && url.path().eq_ignore_ascii_case(DOTNET_LICENSE_PATH) {
        ctx.dest = ctx.license_root.join(DOTNET_LICENSE_FILE);
        return LicenseSource::HtmlFlatten(url.clone());
    }

    if host == OPENSOURCE_HOST {
        let slug = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last());
        if let Some(slug) = slug {
            ctx.dest = ctx
                .license_root
                .join(OPENSOURCE_HOST)
                .join(format!("{slug}.txt"));
            return LicenseSource::HtmlElement {
                url: url.clone(),
                selector: OPENSOURCE_SELECTOR,
            };
        }
    }

    LicenseSource::Unrecognized
}

/// `github.com/<org>/<repo>/blob/<ref>/<path>` → raw-content URL.
fn github_raw_url(url: &Url) -> Option<Url> {
    let path = url.path().replacen("/blob/", "/", 1);
    Url::parse(&format!("https://{GITHUB_RAW_HOST}{path}")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FetchContext {
        FetchContext::new("/licenses/Pkg.1.0.0/license.url.txt", "/licenses")
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_github_blob_rewritten_to_raw() {
        let mut ctx = ctx();
        let source = classify(&url("https://github.com/org/repo/blob/main/LICENSE"), &mut ctx);
        assert_eq!(
            source,
            LicenseSource::File(url("https://raw.githubusercontent.com/org/repo/main/LICENSE"))
        );
        assert_eq!(ctx.dest, PathBuf::from("/licenses/Pkg.1.0.0/license.url.txt"));
    }

    #[test]
    fn test_www_and_case_are_ignored() {
        let mut ctx = ctx();
        let source = classify(&url("https://WWW.GitHub.com/org/repo/blob/v2/LICENSE.md"), &mut ctx);
        assert_eq!(
            source,
            LicenseSource::File(url("https://raw.githubusercontent.com/org/repo/v2/LICENSE.md"))
        );
    }

    #[test]
    fn test_raw_host_is_used_as_is() {
        let raw = url("https://raw.githubusercontent.com/org/repo/main/LICENSE");
        assert_eq!(classify(&raw, &mut ctx()), LicenseSource::File(raw.clone()));
    }

    #[test]
    fn test_github_without_blob_is_unrecognized() {
        let source = classify(&url("https://github.com/org/repo"), &mut ctx());
        assert_eq!(source, LicenseSource::Unrecognized);
    }

    #[test]
    fn test_opensource_rewrites_to_shared_slug_file() {
        let mut ctx = ctx();
        let page = url("https://opensource.org/licenses/MIT");
        let source = classify(&page, &mut ctx);
        assert_eq!(
            source,
            LicenseSource::HtmlElement {
                url: page,
                selector: OPENSOURCE_SELECTOR
            }
        );
        assert_eq!(ctx.dest, PathBuf::from("/licenses/opensource.org/MIT.txt"));
    }

    #[test]
    fn test_dotnet_license_page_is_shared() {
        let mut ctx = ctx();
        let page = url("https://dotnet.microsoft.com/en-us/dotnet_library_license.htm");
        assert_eq!(classify(&page, &mut ctx), LicenseSource::HtmlFlatten(page.clone()));
        assert_eq!(ctx.dest, PathBuf::from("/licenses/dotnet_library_license.txt"));
    }

    #[test]
    fn test_private_domain_is_unrecognized() {
        let mut ctx = ctx();
        let source = classify(&url("https://intranet.contoso.com/legal/eula.html"), &mut ctx);
        assert_eq!(source, LicenseSource::Unrecognized);
        assert_eq!(ctx.dest, PathBuf::from("/licenses/Pkg.1.0.0/license.url.txt"));
    }
}
