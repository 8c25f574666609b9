//! URL 与路由模板解析，以及排除规则

use crate::{audit::transaction::RequestInfo, utils::body::NA};

/// 原始 path + query，缺失时为 "N/A"
pub fn get_url(req: Option<&RequestInfo>) -> String {
    req.and_then(|req| req.url.as_deref())
        .filter(|url| !url.is_empty())
        .unwrap_or(NA)
        .to_string()
}

/// 挂载路径 + 路由模板，例如 `/users` + `/:id` → `/users/:id`
pub fn get_route(req: Option<&RequestInfo>) -> String {
    let Some(req) = req else {
        return NA.to_string();
    };

    match (req.base_path.as_deref(), req.route_path.as_deref()) {
        (Some(base), Some(route)) => format!("{}{}", base, route),
        _ => NA.to_string(),
    }
}

/// URL 或路由包含任一排除项时不审计
pub fn should_audit(exclude_urls: &[String], req: Option<&RequestInfo>) -> bool {
    if exclude_urls.is_empty() {
        return true;
    }

    let url = get_url(req);
    let route = get_route(req);
    exclude_urls
        .iter()
        .all(|path| !(url.contains(path.as_str()) || route.contains(path.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str, base: Option<&str>, route: Option<&str>) -> RequestInfo {
        RequestInfo {
            url: Some(url.to_string()),
            base_path: base.map(str::to_string),
            route_path: route.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_get_url() {
        assert_eq!(get_url(Some(&request("/x?q=1", None, None))), "/x?q=1");
        assert_eq!(get_url(Some(&RequestInfo::default())), NA);
        assert_eq!(get_url(None), NA);
    }

    #[test]
    fn test_get_route() {
        let req = request("/somepath/123", Some("/somepath"), Some("/:id"));
        assert_eq!(get_route(Some(&req)), "/somepath/:id");

        let top_level = request("/health", Some(""), Some("/health"));
        assert_eq!(get_route(Some(&top_level)), "/health");

        assert_eq!(get_route(Some(&request("/x", None, Some("/x")))), NA);
        assert_eq!(get_route(Some(&request("/x", Some("/a"), None))), NA);
        assert_eq!(get_route(None), NA);
    }

    #[test]
    fn test_should_audit_matches_url_or_route() {
        let exclude = vec!["exclude".to_string()];

        assert!(!should_audit(&exclude, Some(&request("/exclude/1", None, None))));
        assert!(!should_audit(
            &exclude,
            Some(&request("/v1/42", Some("/v1"), Some("/exclude-me/:id")))
        ));
        assert!(should_audit(&exclude, Some(&request("/include", None, None))));
    }

    #[test]
    fn test_should_audit_empty_list_is_true() {
        assert!(should_audit(&[], Some(&request("/anything", None, None))));
        assert!(should_audit(&[], None));
    }

    #[test]
    fn test_should_audit_absent_request_contains_na() {
        // 缺失请求时 URL 为 "N/A"，按子串规则同样参与匹配
        let exclude = vec!["N/A".to_string()];
        assert!(!should_audit(&exclude, None));
    }
}
