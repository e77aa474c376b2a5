//! `reqwest` implementation of [`BookingApi`].

use crate::api::{BookingApi, OTP_TYPE, ReserveOutcome};
use crate::config::BookingConfig;
use crate::error::{ApiError, ApiResult};
use crate::pricing::{PriceQuote, ServerQuote, SpecialPrice};
use crate::types::{Booking, FutsalId, NewBooking, Shift, Slot, SlotId, SlotStatus, TrackingCode};
use chrono::{NaiveDate, NaiveTime};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Booking backend over HTTP
#[derive(Clone, Debug)]
pub struct HttpBookingApi {
    client: Client,
    base: String,
}

#[derive(Deserialize)]
struct SlotsBody {
    slots: Vec<Slot>,
}

#[derive(Deserialize)]
struct StatusBody {
    status: SlotStatus,
}

#[derive(Deserialize, Default)]
struct RejectionBody {
    #[serde(default)]
    status: Option<SlotStatus>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpecialPricesBody {
    special_prices: Vec<SpecialPrice>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredBody {
    is_registered: bool,
}

#[derive(Deserialize)]
struct VerifiedBody {
    verified: bool,
}

#[derive(Deserialize)]
struct GeneratedOtpBody {
    #[serde(default)]
    otp_code: Option<String>,
}

#[derive(Deserialize)]
struct BookingBody {
    booking: Booking,
}

#[derive(Serialize)]
struct OtpRequest<'a> {
    contact: &'a str,
    otp_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    otp_code: Option<&'a str>,
}

impl HttpBookingApi {
    /// Client for the backend configured in `config`
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidBaseUrl`] if the URL does not parse, and
    /// [`ApiError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &BookingConfig) -> Result<Self, ApiError> {
        let base = config.api_base();
        let url = Url::parse(&base).map_err(|e| ApiError::InvalidBaseUrl(format!("{base}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidBaseUrl(base));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self { client, base })
    }

    /// REST base this client sends to
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn send(request: RequestBuilder) -> ApiResult<Response> {
        request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))
    }

    async fn json<T: DeserializeOwned>(request: RequestBuilder) -> ApiResult<T> {
        let response = Self::send(request).await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn empty(request: RequestBuilder) -> ApiResult<()> {
        let response = Self::send(request).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }
}

/// Build an [`ApiError::Status`], taking `message` from a JSON body when present
async fn status_error(response: Response) -> ApiError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<RejectionBody>(&body)
        .ok()
        .and_then(|parsed| parsed.message)
        .unwrap_or(body);
    ApiError::Status { status, message }
}

impl BookingApi for HttpBookingApi {
    async fn list_slots(
        &self,
        futsal_id: FutsalId,
        date: NaiveDate,
        shift: Shift,
    ) -> ApiResult<Vec<Slot>> {
        let request = self
            .client
            .get(self.url(&format!("/time-slots/futsal/{futsal_id}")))
            .query(&[
                ("date", date.format("%Y-%m-%d").to_string()),
                ("shift", shift.as_str().to_string()),
            ]);
        Ok(Self::json::<SlotsBody>(request).await?.slots)
    }

    async fn slot_status(&self, slot_id: SlotId) -> ApiResult<SlotStatus> {
        let request = self.client.get(self.url(&format!("/time-slots/{slot_id}/status")));
        Ok(Self::json::<StatusBody>(request).await?.status)
    }

    async fn reserve_slot(&self, slot_id: SlotId) -> ApiResult<ReserveOutcome> {
        let request = self.client.post(self.url(&format!("/time-slots/{slot_id}/reserve")));
        let response = Self::send(request).await?;
        let status = response.status();

        if status.is_success() {
            return Ok(ReserveOutcome::Reserved);
        }
        if status.is_client_error() && status != StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<RejectionBody>(&body).unwrap_or_default();
            return Ok(ReserveOutcome::Rejected {
                status: parsed.status,
                message: parsed.message,
            });
        }
        Err(status_error(response).await)
    }

    async fn release_slot(&self, slot_id: SlotId) -> ApiResult<()> {
        Self::empty(self.client.post(self.url(&format!("/time-slots/{slot_id}/release")))).await
    }

    async fn price_quote(
        &self,
        futsal_id: FutsalId,
        date: NaiveDate,
        start_time: Option<NaiveTime>,
    ) -> ApiResult<PriceQuote> {
        let mut request = self.client.get(self.url(&format!(
            "/special-prices/price/{futsal_id}/{}",
            date.format("%Y-%m-%d")
        )));
        if let Some(start) = start_time {
            request = request.query(&[("startTime", start.format("%H:%M:%S").to_string())]);
        }
        Ok(Self::json::<ServerQuote>(request).await?.into())
    }

    async fn special_prices(&self, futsal_id: FutsalId) -> ApiResult<Vec<SpecialPrice>> {
        let request = self.client.get(self.url(&format!("/special-prices/{futsal_id}")));
        Ok(Self::json::<SpecialPricesBody>(request).await?.special_prices)
    }

    async fn is_registered(&self, phone: &str) -> ApiResult<bool> {
        let request = self
            .client
            .get(self.url(&format!("/users/check-registered/{phone}")));
        Ok(Self::json::<RegisteredBody>(request).await?.is_registered)
    }

    async fn is_otp_verified(&self, phone: &str) -> ApiResult<bool> {
        let request = self
            .client
            .get(self.url("/otp/check-verified"))
            .query(&[("contact", phone), ("contact_type", "phone")]);
        Ok(Self::json::<VerifiedBody>(request).await?.verified)
    }

    async fn generate_otp(&self, phone: &str) -> ApiResult<Option<String>> {
        let request = self.client.post(self.url("/otp/generate")).json(&OtpRequest {
            contact: phone,
            otp_type: OTP_TYPE,
            otp_code: None,
        });
        Ok(Self::json::<GeneratedOtpBody>(request).await?.otp_code)
    }

    async fn verify_otp(&self, phone: &str, code: &str) -> ApiResult<bool> {
        let request = self.client.post(self.url("/otp/verify")).json(&OtpRequest {
            contact: phone,
            otp_type: OTP_TYPE,
            otp_code: Some(code),
        });
        let response = Self::send(request).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Ok(false),
            _ => Err(status_error(response).await),
        }
    }

    async fn create_booking(&self, booking: NewBooking) -> ApiResult<Booking> {
        let request = self.client.post(self.url("/bookings")).json(&booking);
        Ok(Self::json::<BookingBody>(request).await?.booking)
    }

    async fn cancel_booking(&self, tracking_code: &TrackingCode) -> ApiResult<()> {
        Self::empty(
            self.client
                .delete(self.url(&format!("/bookings/cancel/{tracking_code}"))),
        )
        .await
    }
}
