//! Protobuf definitions for the inference service
//!
//! With the `proto-gen` feature the code is generated at build time by
//! tonic-build; otherwise the equivalent checked-in definitions below are
//! used so the crate builds without protoc.

#[cfg(feature = "proto-gen")]
pub mod rightsizing {
    tonic::include_proto!("rightsizing");
}

#[cfg(not(feature = "proto-gen"))]
pub mod rightsizing {
    use prost::Message;

    #[derive(Clone, PartialEq, Message)]
    pub struct TimeSeriesDatapoint {
        #[prost(int64, tag = "1")]
        pub timestamp: i64,
        #[prost(double, tag = "2")]
        pub value: f64,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct ForecastRequest {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(message, repeated, tag = "2")]
        pub data: Vec<TimeSeriesDatapoint>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct ForecastResult {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(message, repeated, tag = "2")]
        pub data: Vec<TimeSeriesDatapoint>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct ForecastResponse {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(message, repeated, tag = "2")]
        pub result: Vec<ForecastResult>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct RightsizingRequest {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(double, repeated, tag = "2")]
        pub data: Vec<f64>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct RightsizingResponse {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(double, tag = "2")]
        pub result: f64,
    }

    pub mod forecast_client {
        use super::*;
        use tonic::codegen::*;

        #[derive(Debug, Clone)]
        pub struct ForecastClient<T> {
            inner: tonic::client::Grpc<T>,
        }

        impl ForecastClient<tonic::transport::Channel> {
            pub fn new(channel: tonic::transport::Channel) -> Self {
                let inner = tonic::client::Grpc::new(channel);
                Self { inner }
            }
        }

        impl<T> ForecastClient<T>
        where
            T: tonic::client::GrpcService<tonic::body::BoxBody>,
            T::Error: Into<StdError>,
            T::ResponseBody: Body<Data = Bytes> + Send + 'static,
            <T::ResponseBody as Body>::Error: Into<StdError> + Send,
        {
            pub async fn forecast(
                &mut self,
                request: impl tonic::IntoRequest<ForecastRequest>,
            ) -> Result<tonic::Response<ForecastResponse>, tonic::Status> {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static("/rightsizing.Forecast/Forecast");
                self.inner.unary(request.into_request(), path, codec).await
            }
        }
    }

    pub mod rightsizing_client {
        use super::*;
        use tonic::codegen::*;

        #[derive(Debug, Clone)]
        pub struct RightsizingClient<T> {
            inner: tonic::client::Grpc<T>,
        }

        impl RightsizingClient<tonic::transport::Channel> {
            pub fn new(channel: tonic::transport::Channel) -> Self {
                let inner = tonic::client::Grpc::new(channel);
                Self { inner }
            }
        }

        impl<T> RightsizingClient<T>
        where
            T: tonic::client::GrpcService<tonic::body::BoxBody>,
            T::Error: Into<StdError>,
            T::ResponseBody: Body<Data = Bytes> + Send + 'static,
            <T::ResponseBody as Body>::Error: Into<StdError> + Send,
        {
            pub async fn rightsizing(
                &mut self,
                request: impl tonic::IntoRequest<RightsizingRequest>,
            ) -> Result<tonic::Response<RightsizingResponse>, tonic::Status> {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
                let codec = tonic::codec::ProstCodec::default();
                let path =
                    http::uri::PathAndQuery::from_static("/rightsizing.Rightsizing/Rightsizing");
                self.inner.unary(request.into_request(), path, codec).await
            }
        }
    }
}

pub use rightsizing::forecast_client::ForecastClient;
pub use rightsizing::rightsizing_client::RightsizingClient;
pub use rightsizing::*;
