// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface VaultFactory {
        struct VaultRecord {
            string vaultId;
            string propertyDetails;
            uint256 dailyBasePrice;
            address owner;
            address vaultAddress;
        }

        // nightNumber == 0 marks a date-range sub-vault keyed by checkIn/checkOut.
        struct SubVaultRecord {
            uint256 nightNumber;
            uint256 checkIn;
            uint256 checkOut;
            address subVault;
            uint8 state;
            uint256 dailyPrice;
        }

        function getAllVaultIds() external view returns (string[] memory);
        function createVault(
            string calldata vaultId,
            string calldata propertyDetails,
            uint256 dailyBasePrice,
            string calldata masterAccessCode
        ) external returns (address);
        function getOrCreateNightVault(
            string calldata vaultId,
            uint256 nightNumber,
            string calldata masterAccessCode
        ) external returns (address);
        function getOrCreateDateVault(
            string calldata vaultId,
            uint256 checkIn,
            uint256 checkOut,
            string calldata masterAccessCode
        ) external returns (address);
        function getVaultInfo(string calldata vaultId) external view returns (VaultRecord memory);
        function getVaultAddress(string calldata vaultId) external view returns (address);
        function isDateRangeAvailable(
            string calldata vaultId,
            uint256 checkIn,
            uint256 checkOut
        ) external view returns (bool);
        function getDailySubVault(string calldata vaultId, uint256 nightNumber) external view returns (address);
        function getDateVault(
            string calldata vaultId,
            uint256 checkIn,
            uint256 checkOut
        ) external view returns (address);
        function getDailySubVaultsInfo(string calldata vaultId) external view returns (SubVaultRecord[] memory);

        error VaultAlreadyExists(string vaultId);
        error VaultNotFound(string vaultId);
        error InvalidAccessCode();
    }

    #[sol(rpc)]
    interface ShareVault {
        struct SubVaultState {
            string parentVaultId;
            uint256 nightNumber;
            uint256 checkIn;
            uint256 checkOut;
            uint8 currentState;
            uint256 dailyPrice;
        }

        struct ReservationRecord {
            address booker;
            uint256 stakeAmount;
            uint256 checkInDate;
            uint256 checkOutDate;
            bool isActive;
        }

        struct BidRecord {
            address bidder;
            uint256 amount;
            uint256 timestamp;
            bool isActive;
        }

        function getVaultInfo() external view returns (SubVaultState memory);
        function getCurrentReservation() external view returns (ReservationRecord memory);
        function getAuctionBids() external view returns (BidRecord[] memory);
        function createReservation(uint256 stakeAmount, uint256 checkInDate, uint256 checkOutDate) external;
        function placeBid(uint256 amount) external;
        function cedeReservation(uint256 bidIndex) external;
        function withdrawBid(uint256 bidIndex) external;
        function checkIn() external;
        function checkOut() external;
        function cancelReservation() external;
        function getMasterAccessCode() external view returns (string memory);
        function getCurrentAccessCode() external view returns (string memory);
        function updateMasterAccessCode(string calldata newCode) external;

        error NotBooker();
        error NotBidder();
        error NotOwner();
        error InvalidState(uint8 current);
        error StakeTooLow(uint256 required, uint256 provided);
        error BidTooLow(uint256 currentStake, uint256 provided);
        error InvalidBidIndex(uint256 index);
        error BidInactive(uint256 index);
    }

    #[sol(rpc)]
    interface ERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}
