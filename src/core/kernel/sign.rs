use crate::core::errors::HttpError;
use crate::core::kernel::interceptor::{Interceptor, Next};
use crate::core::kernel::signer::ParamSigner;
use crate::core::types::{
    CanonicalParams, FormBody, HttpRequest, HttpResponse, MediaType, MultipartBody, Part,
    RequestBody,
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_LENGTH;
use reqwest::Method;
use serde_json::Value;
use tracing::{instrument, trace, warn};

/// Text parts above this size are sent as-is and do not take part in signing
pub const MAX_SIGNED_TEXT_PART_BYTES: u64 = 10 * 1024;

/// How multipart parts are told apart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilePartPolicy {
    /// A filename, file-backed data or a declared non-text type marks a file
    #[default]
    Lenient,
    /// Only a filename or file-backed data marks a file
    Strict,
}

impl FilePartPolicy {
    pub fn is_file(self, part: &Part) -> bool {
        if part.file_name.is_some() || part.is_file_backed() {
            return true;
        }
        match self {
            Self::Lenient => part
                .content_type
                .as_ref()
                .is_some_and(|media| !media.is_text()),
            Self::Strict => false,
        }
    }
}

/// Feeds request parameters through a [`ParamSigner`] and writes them back
pub struct SignInterceptor<S> {
    signer: S,
    file_parts: FilePartPolicy,
}

impl<S: ParamSigner> SignInterceptor<S> {
    pub fn new(signer: S) -> Self {
        Self {
            signer,
            file_parts: FilePartPolicy::default(),
        }
    }

    pub fn with_file_part_policy(mut self, policy: FilePartPolicy) -> Self {
        self.file_parts = policy;
        self
    }

    /// Rewrite `request` with its parameters signed.
    ///
    /// GET requests are signed over the query string, other methods over the
    /// form, JSON or multipart body. Anything else is returned unchanged.
    pub fn apply(&self, mut request: HttpRequest) -> HttpRequest {
        if request.method == Method::GET {
            self.sign_query(&mut request);
            return request;
        }

        let body = std::mem::take(&mut request.body);
        let (body, rewritten) = match body {
            RequestBody::Form(form) => (RequestBody::Form(self.sign_form(&form)), true),
            RequestBody::Bytes { content_type, data }
                if content_type.as_ref().is_some_and(MediaType::is_json) =>
            {
                match self.sign_json(&data) {
                    Some(signed) => (
                        RequestBody::Bytes {
                            content_type,
                            data: signed,
                        },
                        true,
                    ),
                    None => (RequestBody::Bytes { content_type, data }, false),
                }
            }
            RequestBody::Bytes { content_type, data }
                if content_type.as_ref().is_some_and(MediaType::is_form) =>
            {
                let form = FormBody::parse(&data);
                (RequestBody::Form(self.sign_form(&form)), true)
            }
            RequestBody::Multipart(multipart) => {
                (RequestBody::Multipart(self.sign_multipart(multipart)), true)
            }
            other => (other, false),
        };

        request.body = body;
        if rewritten {
            request.headers.remove(CONTENT_LENGTH);
        }
        request
    }

    fn signed(&self, mut params: CanonicalParams) -> Vec<(String, String)> {
        self.signer.prepare_signed_params(&mut params);
        params.to_pairs()
    }

    fn sign_query(&self, request: &mut HttpRequest) {
        let params: CanonicalParams = request.query_pairs().into_iter().collect();
        let pairs = self.signed(params);

        request.url.set_query(None);
        if !pairs.is_empty() {
            request.url.query_pairs_mut().extend_pairs(pairs.iter());
        }
    }

    fn sign_form(&self, form: &FormBody) -> FormBody {
        let params: CanonicalParams = form.fields().iter().cloned().collect();
        FormBody::new(self.signed(params))
    }

    /// `None` when the body is not a JSON object
    fn sign_json(&self, data: &[u8]) -> Option<Bytes> {
        let fields = match serde_json::from_slice::<Value>(data) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => return None,
            Err(e) => {
                warn!(error = %e, "JSON body is not parseable, sending unsigned");
                return None;
            }
        };

        let mut params = CanonicalParams::from(fields);
        self.signer.prepare_signed_params(&mut params);
        match serde_json::to_vec(&Value::Object(params.into_json_object())) {
            Ok(encoded) => Some(Bytes::from(encoded)),
            Err(e) => {
                warn!(error = %e, "failed to re-encode signed JSON body");
                None
            }
        }
    }

    fn sign_multipart(&self, multipart: MultipartBody) -> MultipartBody {
        let mut params = CanonicalParams::new();
        let mut passthrough = Vec::new();

        for part in multipart.parts {
            if self.file_parts.is_file(&part) || part.len() > MAX_SIGNED_TEXT_PART_BYTES {
                passthrough.push(part);
                continue;
            }
            let value = part
                .in_memory()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            params.insert(part.name, value);
        }

        trace!(
            signed = params.len(),
            passthrough = passthrough.len(),
            "signing multipart body"
        );

        let mut parts: Vec<Part> = self
            .signed(params)
            .into_iter()
            .map(|(name, value)| Part::text(name, value))
            .collect();
        parts.extend(passthrough);
        MultipartBody::new(parts)
    }
}

#[async_trait]
impl<S: ParamSigner + 'static> Interceptor for SignInterceptor<S> {
    #[instrument(skip(self, request, next), fields(method = %request.method))]
    async fn intercept(
        &self,
        request: HttpRequest,
        next: Next<'_>,
    ) -> Result<HttpResponse, HttpError> {
        next.run(self.apply(request)).await
    }
}
