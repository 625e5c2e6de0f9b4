//! Deciding whether a delegated result fails its field outright.

use itertools::Itertools;

use crate::graphql::Error;
use crate::proxied_result::ProxiedResult;

/// Checks a delegated result before it is handed to the merged response.
///
/// With `response_key`, the value under that key is checked, otherwise the whole data tree.
///
/// * Without errors the value is returned.
/// * When the value is null and at least one error was reported at or above it (errors
///   without a path count), the field fails: with that error itself if it is the only
///   relevant one, otherwise with a single error combining all of them, their messages joined
///   with newlines and the originals available through [`Error::errors`].
/// * Otherwise the value is returned along with its errors, to be surfaced where they were
///   reported when the value is completed.
pub fn check_result_and_handle_errors(
    result: ProxiedResult,
    response_key: Option<&str>,
) -> Result<ProxiedResult, Error> {
    let target = match response_key {
        Some(key) => result.extract_key(key),
        None => result,
    };
    if !target.has_errors() || !target.is_null() || !target.has_errors_at_or_above() {
        return Ok(target);
    }

    let relevant = target.relevant_errors().collect::<Vec<_>>();
    match relevant.as_slice() {
        [(error_path, error)] => Err(target
            .relocate(error_path, error)
            .with_original((*error).clone())),
        errors => Err(Error::builder()
            .message(errors.iter().map(|(_, error)| &error.message).join("\n"))
            .path(target.outer_path())
            .build()
            .with_combined(errors.iter().map(|(_, error)| (*error).clone()).collect())),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::graphql::Response;
    use crate::json_ext::Path;

    fn check(response: Response) -> Result<ProxiedResult, Error> {
        check_result_and_handle_errors(
            ProxiedResult::new(response, Path::empty()),
            Some("responseKey"),
        )
    }

    #[test]
    fn returns_the_value_without_errors() {
        let result = check(
            Response::builder()
                .data(json!({"responseKey": {"a": 1}}))
                .build(),
        )
        .unwrap();
        assert_eq!(result.data(), Some(&json!({"a": 1})));
        assert_eq!(result.outer_path(), path!["responseKey"]);
    }

    #[test]
    fn persists_single_error() {
        let original = Error::builder().message("Test error").build();
        let error = check(Response::from_errors(vec![original.clone()])).unwrap_err();
        assert_eq!(error.message, "Test error");
        assert_eq!(error.original_error(), Some(&original));
        assert!(error.errors().is_none());
        assert!(error.original_error().unwrap().errors().is_none());
    }

    #[test]
    fn persists_single_error_with_extensions() {
        let original = Error::builder()
            .message("Test error")
            .extension_code("UNAUTHENTICATED")
            .build();
        let error = check(Response::from_errors(vec![original])).unwrap_err();
        assert_eq!(error.message, "Test error");
        assert_eq!(error.extension_code().as_deref(), Some("UNAUTHENTICATED"));
        assert!(error.errors().is_none());
    }

    #[test]
    fn combines_errors_and_persists_the_original_errors() {
        let originals = vec![
            Error::builder().message("Error1").build(),
            Error::builder().message("Error2").build(),
        ];
        let error = check(Response::from_errors(originals.clone())).unwrap_err();
        assert_eq!(error.message, "Error1\nError2");
        assert_eq!(error.errors(), Some(originals.as_slice()));
        assert_eq!(error.path, Some(path!["responseKey"]));
    }

    #[test]
    fn single_error_is_located_at_the_field() {
        let error = check(
            Response::builder()
                .data(json!({"responseKey": null}))
                .error(
                    Error::builder()
                        .message("not found")
                        .path(path!["responseKey"])
                        .build(),
                )
                .build(),
        )
        .unwrap_err();
        assert_eq!(error.path, Some(path!["responseKey"]));
    }

    #[test]
    fn deep_errors_are_kept_for_completion() {
        let result = check(
            Response::builder()
                .data(json!({"responseKey": null}))
                .error(
                    Error::builder()
                        .message("deep")
                        .path(path!["responseKey", "list", 1, "field"])
                        .build(),
                )
                .build(),
        )
        .unwrap();
        assert!(result.is_null());
        assert_eq!(
            result.surfaced_errors()[0].path,
            Some(path!["responseKey", "list", 1, "field"])
        );
    }

    #[test]
    fn partial_data_is_not_a_failure() {
        let result = check(
            Response::builder()
                .data(json!({"responseKey": {"a": null}}))
                .error(Error::builder().message("global").build())
                .build(),
        )
        .unwrap();
        assert_eq!(result.data(), Some(&json!({"a": null})));
    }
}
