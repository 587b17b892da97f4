//! REST storage backend for a hosted PostgREST-style database.
//!
//! Every collection maps to a table under `/rest/v1/`; counters are
//! incremented server-side by the `next_sequence` RPC so that concurrent
//! clients never share a piece or invoice number.

/// Path prefix of the table endpoints.
const TABLES_PATH: &str = "rest/v1/";

/// RPC endpoint incrementing a named counter.
const NEXT_SEQUENCE_PATH: &str = "rest/v1/rpc/next_sequence";

/// Table holding the named counters.
const SEQUENCES_TABLE: &str = "sequences";

/// Header carrying the project API key.
const API_KEY_HEADER: &str = "apikey";

/// Header selecting the upsert conflict resolution.
const PREFER_HEADER: &str = "Prefer";

/// Conflict resolution requested on upserts.
const MERGE_DUPLICATES: &str = "resolution=merge-duplicates";

/// Filter matching every row of a table.
const MATCH_ALL: &str = "not.is.null";

/// Parses the base URL, making sure relative joins keep its path.
fn parse_base_url(raw: &str) -> crate::error::Result<url::Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_owned()
    } else {
        format!("{raw}/")
    };
    url::Url::parse(&normalized).map_err(|err| crate::error::LedgerError::Storage(Box::new(err)))
}

/// Builds the PostgREST `in` filter for a list of identifiers.
fn in_filter<K: core::fmt::Display>(ids: &[K]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.to_string().replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

/// Generates a REST storage backend (async or blocking) with builder,
/// methods, and tests.
macro_rules! define_rest_storage {
    (
        storage_name: $storage:ident,
        builder_name: $builder:ident,
        http_type: $http_type:ty,
        request_type: $request_type:ty,
        response_type: $resp_type:ty,
        storage_doc: $storage_doc:expr,
        builder_doc: $builder_doc:expr,
        $(async_kw: $async_kw:tt,)?
        $(await_kw: $await_ext:tt,)?
    ) => {
        #[doc = $builder_doc]
        #[derive(Debug)]
        pub struct $builder {
            /// Project base URL.
            base_url: Option<String>,
            /// API key sent with every request.
            api_key: Option<SecretString>,
        }

        impl $builder {
            /// Sets the project base URL (e.g. `https://xyz.supabase.co`).
            #[inline]
            #[must_use]
            pub fn base_url<T: Into<String>>(mut self, url: T) -> Self {
                self.base_url = Some(url.into());
                self
            }

            /// Sets the API key used for authentication.
            #[inline]
            #[must_use]
            pub fn api_key<T: Into<String>>(mut self, key: T) -> Self {
                self.api_key = Some(SecretString::from(key.into()));
                self
            }

            /// Builds the storage backend.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::MissingApiKey`] if no API key was provided.
            /// Returns [`LedgerError::Storage`] if the base URL is missing or
            /// invalid.
            /// Returns [`LedgerError::Http`] if the HTTP client fails to build.
            #[inline]
            #[tracing::instrument(skip_all)]
            pub fn build(self) -> Result<$storage> {
                let api_key = self.api_key.ok_or(LedgerError::MissingApiKey)?;
                let raw_url = self
                    .base_url
                    .ok_or_else(|| LedgerError::Storage("REST storage requires a base URL".into()))?;
                let base_url = parse_base_url(&raw_url)?;
                tracing::debug!(base_url = %base_url, "building REST storage");
                let http = <$http_type>::builder().build()?;

                Ok($storage {
                    http,
                    api_key,
                    base_url,
                })
            }
        }

        #[doc = $storage_doc]
        #[derive(Debug)]
        pub struct $storage {
            /// Underlying HTTP client.
            http: $http_type,
            /// Project API key.
            api_key: SecretString,
            /// Project base URL, always ending with `/`.
            base_url: Url,
        }

        impl $storage {
            /// Creates a new builder for configuring the backend.
            #[inline]
            #[must_use]
            pub const fn builder() -> $builder {
                $builder {
                    base_url: None,
                    api_key: None,
                }
            }

            /// Returns the URL of `path` relative to the base URL.
            fn endpoint(&self, path: &str) -> Result<Url> {
                self.base_url
                    .join(path)
                    .map_err(|err| LedgerError::Storage(Box::new(err)))
            }

            /// Returns the URL of a table.
            fn table(&self, table: &str) -> Result<Url> {
                self.endpoint(&format!("{TABLES_PATH}{table}"))
            }

            /// Adds the authentication headers to a request.
            fn authorize(&self, request: $request_type) -> $request_type {
                let key = self.api_key.expose_secret();
                request
                    .header(API_KEY_HEADER, key)
                    .header(AUTHORIZATION, format!("Bearer {key}"))
            }

            /// Sends a request and turns non-success statuses into
            /// [`LedgerError::Api`].
            #[tracing::instrument(skip_all)]
            $($async_kw)? fn send(&self, request: $request_type) -> Result<$resp_type> {
                let response: $resp_type = self.authorize(request).send() $( .$await_ext )? ?;
                let status = response.status();
                tracing::debug!(status = %status, "received response");
                if status.is_success() {
                    Ok(response)
                } else {
                    let message = response
                        .text()
                        $( .$await_ext )?
                        .unwrap_or_else(|_| "unknown error".to_owned());
                    tracing::debug!(status = status.as_u16(), message = %message, "API error");
                    Err(LedgerError::Api {
                        status: status.as_u16(),
                        message,
                    })
                }
            }

            /// Reads every row of a collection table.
            #[tracing::instrument(skip_all, fields(table = T::COLLECTION))]
            $($async_kw)? fn read_all<T: Record>(&self) -> Result<Vec<T>> {
                let url = self.table(T::COLLECTION)?;
                let request = self.http.get(url).query(&[("select", "*")]);
                let response = self.send(request) $( .$await_ext )? ?;
                let body = response.text() $( .$await_ext )? ?;
                tracing::trace!(body_len = body.len(), "parsing rows");
                serde_json::from_str(&body).map_err(LedgerError::from)
            }

            /// Upserts rows, merging on the primary key.
            #[tracing::instrument(skip_all, fields(table = T::COLLECTION, count = items.len()))]
            $($async_kw)? fn upsert_all<T: Record>(&self, items: Vec<T>) -> Result<()> {
                if items.is_empty() {
                    return Ok(());
                }
                let url = self.table(T::COLLECTION)?;
                let request = self
                    .http
                    .post(url)
                    .header(PREFER_HEADER, MERGE_DUPLICATES)
                    .header(CONTENT_TYPE, "application/json")
                    .json(&items);
                let _response = self.send(request) $( .$await_ext )? ?;
                Ok(())
            }

            /// Deletes rows by primary key.
            #[tracing::instrument(skip_all, fields(table = T::COLLECTION, count = ids.len()))]
            $($async_kw)? fn remove_all<T: Record>(&self, ids: &[T::Key]) -> Result<()> {
                if ids.is_empty() {
                    return Ok(());
                }
                let url = self.table(T::COLLECTION)?;
                let request = self.http.delete(url).query(&[("id", in_filter(ids))]);
                let _response = self.send(request) $( .$await_ext )? ?;
                Ok(())
            }

            /// Increments a counter through the `next_sequence` RPC.
            #[tracing::instrument(skip_all, fields(counter = %counter))]
            $($async_kw)? fn allocate(&self, counter: &str) -> Result<u64> {
                let url = self.endpoint(NEXT_SEQUENCE_PATH)?;
                let request = self
                    .http
                    .post(url)
                    .header(CONTENT_TYPE, "application/json")
                    .json(&serde_json::json!({ "counter": counter }));
                let response = self.send(request) $( .$await_ext )? ?;
                let body = response.text() $( .$await_ext )? ?;
                serde_json::from_str(&body).map_err(LedgerError::from)
            }

            /// Deletes every row of every table, counters included.
            #[tracing::instrument(skip_all)]
            $($async_kw)? fn clear_all(&self) -> Result<()> {
                for table in COLLECTIONS {
                    let url = self.table(table)?;
                    let request = self.http.delete(url).query(&[("id", MATCH_ALL)]);
                    let _response = self.send(request) $( .$await_ext )? ?;
                }
                let url = self.table(SEQUENCES_TABLE)?;
                let request = self.http.delete(url).query(&[("name", MATCH_ALL)]);
                let _response = self.send(request) $( .$await_ext )? ?;
                Ok(())
            }
        }

    };
}

#[cfg(feature = "async")]
mod async_storage {
    //! Async REST storage backend.

    use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
    use secrecy::{ExposeSecret, SecretString};
    use url::Url;

    use super::{
        API_KEY_HEADER, MATCH_ALL, MERGE_DUPLICATES, NEXT_SEQUENCE_PATH, PREFER_HEADER,
        SEQUENCES_TABLE, TABLES_PATH, in_filter, parse_base_url,
    };
    use crate::error::{LedgerError, Result};
    use crate::storage::{COLLECTIONS, Record};

    define_rest_storage! {
        storage_name: RestStorage,
        builder_name: RestStorageBuilder,
        http_type: reqwest::Client,
        request_type: reqwest::RequestBuilder,
        response_type: reqwest::Response,
        storage_doc: "Async storage backend over a PostgREST-style HTTP API.\n\nUse [`RestStorage::builder()`] to construct an instance.",
        builder_doc: "Builder for constructing a [`RestStorage`].",
        async_kw: async,
        await_kw: await,
    }

    forward_storage!(async_native: RestStorage);

    #[cfg(test)]
    mod http_tests {
        use serde_json::json;
        use wiremock::matchers::{body_json, header, method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        use super::*;
        use crate::models::{Journal, JournalId, JournalKind};
        use crate::storage::Storage;

        fn journal(id: &str) -> Journal {
            Journal {
                id: JournalId::from(id),
                code: "VT".to_owned(),
                label: "Ventes".to_owned(),
                prefix: "VT".to_owned(),
                kind: JournalKind::Sales,
            }
        }

        async fn storage(server: &MockServer) -> RestStorage {
            RestStorage::builder()
                .base_url(server.uri())
                .api_key("anon-key")
                .build()
                .unwrap()
        }

        #[tokio::test]
        async fn reads_rows_with_auth_headers() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/journals"))
                .and(query_param("select", "*"))
                .and(header("apikey", "anon-key"))
                .and(header("authorization", "Bearer anon-key"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                    {"id": "j-vt", "code": "VT", "label": "Ventes", "prefix": "VT", "kind": "sales"}
                ])))
                .expect(1)
                .mount(&server)
                .await;

            let journals = storage(&server).await.journals().await.unwrap();
            assert_eq!(journals, vec![journal("j-vt")]);
        }

        #[tokio::test]
        async fn upsert_requests_merge_on_conflict() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/rest/v1/journals"))
                .and(header("prefer", "resolution=merge-duplicates"))
                .and(body_json(json!([
                    {"id": "j-vt", "code": "VT", "label": "Ventes", "prefix": "VT", "kind": "sales"}
                ])))
                .respond_with(ResponseTemplate::new(201))
                .expect(1)
                .mount(&server)
                .await;

            storage(&server)
                .await
                .upsert_journals(vec![journal("j-vt")])
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn remove_filters_by_id_list() {
            let server = MockServer::start().await;
            Mock::given(method("DELETE"))
                .and(path("/rest/v1/journals"))
                .and(query_param("id", "in.(\"j-1\",\"j-2\")"))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;

            storage(&server)
                .await
                .remove_journals(&[JournalId::from("j-1"), JournalId::from("j-2")])
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn next_sequence_calls_rpc() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/rest/v1/rpc/next_sequence"))
                .and(body_json(json!({"counter": "journal:j-vt"})))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!(42)))
                .expect(1)
                .mount(&server)
                .await;

            let value = storage(&server)
                .await
                .next_sequence("journal:j-vt")
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        #[tokio::test]
        async fn error_status_maps_to_api_error() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/sales"))
                .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
                .mount(&server)
                .await;

            let err = storage(&server).await.sales().await.unwrap_err();
            assert!(matches!(
                err,
                LedgerError::Api { status: 401, message } if message == "invalid key"
            ));
        }

        #[tokio::test]
        async fn clear_deletes_every_table() {
            let server = MockServer::start().await;
            Mock::given(method("DELETE"))
                .and(query_param("id", "not.is.null"))
                .respond_with(ResponseTemplate::new(204))
                .expect(9)
                .mount(&server)
                .await;
            Mock::given(method("DELETE"))
                .and(path("/rest/v1/sequences"))
                .and(query_param("name", "not.is.null"))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;

            storage(&server).await.clear().await.unwrap();
        }
    }
}

#[cfg(feature = "blocking")]
mod blocking_storage {
    //! Blocking (synchronous) REST storage backend.

    use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
    use secrecy::{ExposeSecret, SecretString};
    use url::Url;

    use super::{
        API_KEY_HEADER, MATCH_ALL, MERGE_DUPLICATES, NEXT_SEQUENCE_PATH, PREFER_HEADER,
        SEQUENCES_TABLE, TABLES_PATH, in_filter, parse_base_url,
    };
    use crate::error::{LedgerError, Result};
    use crate::storage::{COLLECTIONS, Record};

    define_rest_storage! {
        storage_name: BlockingRestStorage,
        builder_name: BlockingRestStorageBuilder,
        http_type: reqwest::blocking::Client,
        request_type: reqwest::blocking::RequestBuilder,
        response_type: reqwest::blocking::Response,
        storage_doc: "Blocking storage backend over a PostgREST-style HTTP API.\n\nUse [`BlockingRestStorage::builder()`] to construct an instance.",
        builder_doc: "Builder for constructing a [`BlockingRestStorage`].",
    }

    forward_storage!(blocking: BlockingRestStorage);
}

#[cfg(feature = "async")]
pub use async_storage::{RestStorage, RestStorageBuilder};
#[cfg(feature = "blocking")]
pub use blocking_storage::{BlockingRestStorage, BlockingRestStorageBuilder};
