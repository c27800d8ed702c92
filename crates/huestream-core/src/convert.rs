// ── API-to-domain type conversions ──
//
// Bridges raw `huestream_api` response types into canonical domain types.

use huestream_api::clip::models::EntertainmentConfigurationResponse;

use crate::model::{EntertainmentConfiguration, LightDescriptor};

impl From<&EntertainmentConfigurationResponse> for EntertainmentConfiguration {
    fn from(resp: &EntertainmentConfigurationResponse) -> Self {
        // CLIP v2 streams by channel; every channel is a plain light slot.
        let lights = resp
            .channels
            .iter()
            .map(|c| LightDescriptor::light(c.channel_id))
            .collect();
        Self::new(resp.id.clone(), resp.display_name(), lights)
    }
}

impl From<EntertainmentConfigurationResponse> for EntertainmentConfiguration {
    fn from(resp: EntertainmentConfigurationResponse) -> Self {
        Self::from(&resp)
    }
}
