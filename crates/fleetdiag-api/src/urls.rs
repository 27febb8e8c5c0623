// Controller endpoint URLs.

use url::Url;
use uuid::Uuid;

use crate::error::Error;

/// Build the URL of a controller edge-device endpoint.
///
/// v2: `https://<server>/api/v2/edgedevice/[id/<uuid>/]<action>`
/// v1: `https://<server>/api/v1/edgedevice/<action>`
///
/// A nil device id is treated as unknown.
pub fn controller_url(
    server: &str,
    v2: bool,
    device: Option<Uuid>,
    action: &str,
) -> Result<Url, Error> {
    let server = server
        .trim()
        .trim_start_matches("https://")
        .trim_end_matches('/');
    let path = if v2 {
        match device.filter(|id| !id.is_nil()) {
            Some(id) => format!("api/v2/edgedevice/id/{id}/{action}"),
            None => format!("api/v2/edgedevice/{action}"),
        }
    } else {
        format!("api/v1/edgedevice/{action}")
    };
    Ok(Url::parse(&format!("https://{server}/{path}"))?)
}
