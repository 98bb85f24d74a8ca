use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use log::{debug, info};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::time::sleep;

use crate::{
    ApiKey,
    error::{GenerationError, MediaKind, ProviderError, Result},
    media::{ImageResult, MediaHandle, VideoResult, split_data_url},
    media_api::{ApiFuture, ImageRequest, MediaApi, TextRequest, VideoRequest},
};

pub mod gemini_api;
use gemini_api::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, ImageParameters,
    InlineImageData, Operation, OutputOptions, Part, PredictRequest, PredictResponse,
    PromptInstance, VideoParameters,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const IMAGE_MIME_TYPE: &str = "image/jpeg";
const KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub text_model: String,
    /// Pause between two status checks of a running video job
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            text_model: DEFAULT_TEXT_MODEL.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: Duration::from_secs(60 * 3),
        }
    }
}

/// Imagen, Veo and Gemini over the Generative Language REST API
#[derive(Clone)]
pub struct GeminiClient {
    api_key: ApiKey,
    client: Client,
    options: ClientOptions,
}

impl GeminiClient {
    pub fn new(api_key: ApiKey, options: ClientOptions) -> Self {
        Self {
            api_key,
            client: Client::new(),
            options,
        }
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{model}:{method}",
            self.options.base_url.trim_end_matches('/')
        )
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(KEY_HEADER, self.api_key.expose())
            .timeout(self.options.request_timeout)
    }

    async fn submit_video(&self, request: &VideoRequest) -> Result<Operation> {
        let inline = request
            .source_image
            .as_deref()
            .map(split_data_url)
            .transpose()?;

        let body = PredictRequest {
            instances: vec![PromptInstance {
                prompt: &request.prompt,
                image: inline.as_ref().map(|img| InlineImageData {
                    bytes_base64_encoded: &img.data,
                    mime_type: &img.mime_type,
                }),
            }],
            parameters: VideoParameters { sample_count: 1 },
        };

        let url = self.model_url(request.model.api_name(), "predictLongRunning");
        let resp = self.authed(self.client.post(url).json(&body)).send().await?;
        read_json(resp).await
    }

    async fn poll_operation(&self, mut operation: Operation) -> Result<Operation> {
        let url = format!(
            "{}/{}",
            self.options.base_url.trim_end_matches('/'),
            operation.name
        );

        while !operation.done {
            debug!("video operation {} still running", operation.name);
            sleep(self.options.poll_interval).await;
            let resp = self.authed(self.client.get(&url)).send().await?;
            operation = read_json(resp).await?;
        }

        Ok(operation)
    }

    async fn download(&self, uri: &str) -> Result<bytes::Bytes> {
        let resp = self.authed(self.client.get(uri)).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GenerationError::Download {
                status: status.to_string(),
            });
        }

        Ok(resp.bytes().await?)
    }
}

/// Outcome of a finished video operation: the URI to download
fn finished_video_uri(operation: &Operation) -> Result<&str> {
    if let Some(err) = &operation.error {
        return Err(GenerationError::Operation(err.describe()));
    }
    operation.video_uri().ok_or(GenerationError::EmptyResult {
        kind: MediaKind::Video,
    })
}

/// Decodes the first prediction that carries image data
fn first_image(response: PredictResponse) -> Result<MediaHandle> {
    let (data, mime_type) = response
        .predictions
        .into_iter()
        .find_map(|p| Some((p.bytes_base64_encoded?, p.mime_type)))
        .ok_or(GenerationError::EmptyResult {
            kind: MediaKind::Image,
        })?;

    let data = BASE64
        .decode(data)
        .map_err(|e| ProviderError::Api(format!("undecodable image data: {e}")))?;
    Ok(MediaHandle::new(
        mime_type.unwrap_or_else(|| IMAGE_MIME_TYPE.into()),
        data,
    ))
}

/// Deserializes a success body, or classifies the provider's error body
async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        debug!("provider error {status}: {body}");
        return Err(gemini_api::parse_error(status.as_u16(), &body).into());
    }
    Ok(serde_json::from_str(&body)?)
}

impl MediaApi for GeminiClient {
    fn generate_image<'a>(&'a self, request: &'a ImageRequest) -> ApiFuture<'a, ImageResult> {
        Box::pin(async move {
            let aspect_ratio = request.aspect_ratio.to_string();
            let body = PredictRequest {
                instances: vec![PromptInstance {
                    prompt: &request.prompt,
                    image: None,
                }],
                parameters: ImageParameters {
                    sample_count: 1,
                    aspect_ratio: &aspect_ratio,
                    output_options: OutputOptions {
                        mime_type: IMAGE_MIME_TYPE,
                    },
                },
            };

            let url = self.model_url(request.model.api_name(), "predict");
            let resp = self.authed(self.client.post(url).json(&body)).send().await?;
            let media = first_image(read_json(resp).await?)?;

            info!(
                "generated image with {} ({} bytes)",
                request.model,
                media.data().map_or(0, |d| d.len())
            );
            Ok(ImageResult {
                prompt: request.prompt.clone(),
                media,
            })
        })
    }

    fn generate_video<'a>(&'a self, request: &'a VideoRequest) -> ApiFuture<'a, VideoResult> {
        Box::pin(async move {
            let operation = self.submit_video(request).await?;
            info!("submitted video job {}", operation.name);

            let operation = self.poll_operation(operation).await?;
            let data = self.download(finished_video_uri(&operation)?).await?;

            info!("downloaded video of job {} ({} bytes)", operation.name, data.len());
            Ok(VideoResult {
                prompt: request.prompt.clone(),
                media: MediaHandle::new("video/mp4", data),
            })
        })
    }

    fn generate_text<'a>(&'a self, request: &'a TextRequest) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let body = GenerateContentRequest {
                system_instruction: Content {
                    role: None,
                    parts: vec![Part {
                        text: &request.system_instruction,
                    }],
                },
                contents: vec![Content {
                    role: Some("user"),
                    parts: vec![Part {
                        text: &request.prompt,
                    }],
                }],
                generation_config: request.response_schema.as_ref().map(|schema| {
                    GenerationConfig {
                        response_mime_type: "application/json",
                        response_schema: schema,
                    }
                }),
            };

            let url = self.model_url(&self.options.text_model, "generateContent");
            let resp = self.authed(self.client.post(url).json(&body)).send().await?;
            let response: GenerateContentResponse = read_json(resp).await?;

            response.text().ok_or(GenerationError::EmptyResult {
                kind: MediaKind::Prompt,
            })
        })
    }

    fn clone(&self) -> Box<dyn MediaApi + Send + Sync + 'static> {
        Box::new(Clone::clone(self))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::VideoModel;

    fn client(base_url: &str) -> GeminiClient {
        GeminiClient {
            api_key: ApiKey::new("test-key").unwrap(),
            client: Client::builder().no_proxy().build().unwrap(),
            options: ClientOptions {
                base_url: base_url.into(),
                poll_interval: Duration::from_millis(1),
                ..Default::default()
            },
        }
    }

    fn operation(value: serde_json::Value) -> Operation {
        serde_json::from_value(value).unwrap()
    }

    fn finished(uri: &str) -> String {
        json!({
            "name": "operations/abc",
            "done": true,
            "response": {"generateVideoResponse": {"generatedSamples": [{"video": {"uri": uri}}]}}
        })
        .to_string()
    }

    fn video_request() -> VideoRequest {
        VideoRequest {
            prompt: "a cat".into(),
            model: VideoModel::Veo2,
            source_image: None,
        }
    }

    /// Local HTTP server answering one request per connection with scripted replies
    mod stub {
        use reqwest::StatusCode;
        use tokio::{
            io::{AsyncReadExt, AsyncWriteExt},
            net::{TcpListener, TcpStream},
            task::JoinHandle,
        };

        pub struct Server {
            listener: TcpListener,
            pub base_url: String,
        }

        impl Server {
            pub async fn bind() -> Self {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let base_url = format!("http://{}", listener.local_addr().unwrap());
                Self { listener, base_url }
            }

            /// Resolves to the heads of the requests it answered, in order
            pub fn serve(self, replies: Vec<(u16, String)>) -> JoinHandle<Vec<String>> {
                tokio::spawn(async move {
                    let mut heads = vec![];
                    for (status, body) in replies {
                        let (mut sock, _) = self.listener.accept().await.unwrap();
                        heads.push(read_head(&mut sock).await);

                        let reason = StatusCode::from_u16(status)
                            .unwrap()
                            .canonical_reason()
                            .unwrap_or("");
                        let reply = format!(
                            "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                            body.len()
                        );
                        sock.write_all(reply.as_bytes()).await.unwrap();
                        sock.shutdown().await.ok();
                    }
                    heads
                })
            }
        }

        /// Reads one full request and returns its head
        async fn read_head(sock: &mut TcpStream) -> String {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = sock.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                    assert!(n > 0, "connection closed mid request");
                    continue;
                };
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .map_or(0, |v| v.trim().parse::<usize>().unwrap());
                if buf.len() >= end + 4 + body_len || n == 0 {
                    return head;
                }
            }
        }
    }

    #[test]
    fn builds_model_urls() {
        let c = client("https://example.test/v1beta/");
        assert_eq!(
            c.model_url("veo-2.0-generate-001", "predictLongRunning"),
            "https://example.test/v1beta/models/veo-2.0-generate-001:predictLongRunning"
        );
    }

    #[test]
    fn finished_operation_outcomes() {
        let failed = operation(json!({
            "name": "operations/abc",
            "done": true,
            "error": {"code": 3, "message": "Video generation failed."}
        }));
        let err = finished_video_uri(&failed).unwrap_err();
        assert_eq!(err.to_string(), "Operation error: Video generation failed.");

        let empty = operation(json!({"name": "operations/abc", "done": true, "response": {}}));
        assert!(matches!(
            finished_video_uri(&empty),
            Err(GenerationError::EmptyResult {
                kind: MediaKind::Video
            })
        ));

        let done: Operation = serde_json::from_str(&finished("https://example.test/v")).unwrap();
        assert_eq!(finished_video_uri(&done).unwrap(), "https://example.test/v");
    }

    #[test]
    fn first_prediction_with_data_wins() {
        let none: PredictResponse = serde_json::from_str(r#"{"predictions": []}"#).unwrap();
        assert!(matches!(
            first_image(none),
            Err(GenerationError::EmptyResult {
                kind: MediaKind::Image
            })
        ));

        let filtered: PredictResponse = serde_json::from_value(json!({"predictions": [
            {"raiFilteredReason": "blocked"},
            {"bytesBase64Encoded": "AQID"}
        ]}))
        .unwrap();
        let media = first_image(filtered).unwrap();
        assert_eq!(media.mime_type(), "image/jpeg");
        assert_eq!(&media.data().unwrap()[..], &[1u8, 2, 3]);
    }

    #[tokio::test]
    async fn video_is_polled_until_done_then_downloaded() {
        let server = stub::Server::bind().await;
        let base = server.base_url.clone();
        let pending = json!({"name": "operations/abc", "done": false}).to_string();
        let heads = server.serve(vec![
            (200, json!({"name": "operations/abc"}).to_string()),
            (200, pending),
            (200, finished(&format!("{base}/files/v:download"))),
            (200, "MP4".into()),
        ]);

        let video = client(&base).generate_video(&video_request()).await.unwrap();
        assert_eq!(&video.media.data().unwrap()[..], b"MP4");
        assert_eq!(video.media.mime_type(), "video/mp4");

        let heads = heads.await.unwrap();
        let lines: Vec<_> = heads.iter().filter_map(|h| h.lines().next()).collect();
        assert_eq!(
            lines,
            vec![
                format!(
                    "post /models/{}:predictlongrunning http/1.1",
                    VideoModel::Veo2.api_name().to_ascii_lowercase()
                ),
                "get /operations/abc http/1.1".into(),
                "get /operations/abc http/1.1".into(),
                "get /files/v:download http/1.1".into(),
            ]
        );
        assert!(heads.iter().all(|h| h.contains("x-goog-api-key: test-key")));
    }

    #[tokio::test]
    async fn failed_download_reports_its_status() {
        let server = stub::Server::bind().await;
        let base = server.base_url.clone();
        let heads = server.serve(vec![
            (200, finished(&format!("{base}/files/v:download"))),
            (404, String::new()),
        ]);

        let err = client(&base).generate_video(&video_request()).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to download video: 404 Not Found");
        assert_eq!(heads.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn provider_errors_are_classified() {
        let server = stub::Server::bind().await;
        let base = server.base_url.clone();
        let body = json!({"error": {"code": 400, "message": "API key not valid. Please pass a valid API key."}});
        let _heads = server.serve(vec![(400, body.to_string())]);

        let err = client(&base).generate_video(&video_request()).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Provider(ProviderError::InvalidKey)
        ));
    }

    #[tokio::test]
    async fn malformed_source_image_fails_before_any_request() {
        // nothing listens here; reaching the network would yield a network error instead
        let c = client("http://127.0.0.1:9");
        let request = VideoRequest {
            source_image: Some("image/png,AAAA".into()),
            ..video_request()
        };

        let err = c.generate_video(&request).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidImageFormat), "{err:?}");
    }
}
